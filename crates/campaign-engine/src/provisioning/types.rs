//! Report types returned by provisioning, reconciliation and teardown
//!
//! Every gateway-backed step is reported as an [`Outcome`] so a caller can
//! surface partial success instead of an opaque failure.

use serde::Serialize;

use crate::database::NumberMove;
use crate::gateway::GatewayError;
use crate::types::{Campaign, CampaignAgent, DispatchRule, PhoneNumber, Trunk};

/// Outcome of one best-effort step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome<T> {
    Success { resource: T },
    /// The step did not apply (no platform trunk, no agents, ...)
    Skipped { message: String },
    Error { message: String },
}

impl<T> Outcome<T> {
    pub fn skipped(message: impl Into<String>) -> Self {
        Outcome::Skipped {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outcome::Error {
            message: message.into(),
        }
    }

    pub fn resource(&self) -> Option<&T> {
        match self {
            Outcome::Success { resource } => Some(resource),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error { .. })
    }
}

impl<T> From<GatewayError> for Outcome<T> {
    fn from(err: GatewayError) -> Self {
        Outcome::error(err.to_string())
    }
}

/// Composite result of creating a campaign
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningResult {
    pub campaign: Campaign,
    pub agents: Vec<CampaignAgent>,
    pub phone_numbers: Vec<PhoneNumber>,
    pub trunk: Outcome<Trunk>,
    pub dispatch_rule: Outcome<DispatchRule>,
    /// Inbound trunks of campaigns that lost numbers to this one
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub displaced_campaign_syncs: Vec<TrunkSync>,
}

/// Result of updating a campaign; absent fields were not touched
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub campaign: Campaign,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<CampaignAgent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number_updates: Option<ReconciliationResult>,
    /// Trunk provisioned during the update for a campaign that had none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trunk_update: Option<Outcome<Trunk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_rule_update: Option<Outcome<DispatchRule>>,
}

/// A campaign with everything provisioned for it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDetails {
    pub campaign: Campaign,
    pub agents: Vec<CampaignAgent>,
    pub phone_numbers: Vec<PhoneNumber>,
    pub trunk: Option<Trunk>,
    pub dispatch_rules: Vec<DispatchRule>,
}

/// Result of making a set of numbers exactly the campaign's numbers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub assigned: Vec<String>,
    pub unassigned: Vec<String>,
    pub reassigned_from: Vec<NumberMove>,
    /// The campaign's numbers after the change
    pub numbers: Vec<PhoneNumber>,
    /// Upstream sync of the campaign's INBOUND trunk
    pub trunk_update: Outcome<Trunk>,
    /// Inbound trunks of campaigns that lost numbers to this one
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub displaced_campaign_syncs: Vec<TrunkSync>,
}

/// Upstream number re-sync of another campaign's trunk
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrunkSync {
    pub campaign_id: String,
    pub trunk_update: Outcome<Trunk>,
}

/// Status of one half of a cleanup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupStep {
    pub status: CleanupStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupStatus {
    Success,
    Skipped,
    Error,
}

impl CleanupStep {
    pub fn success() -> Self {
        Self {
            status: CleanupStatus::Success,
            message: None,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: CleanupStatus::Skipped,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CleanupStatus::Error,
            message: Some(message.into()),
        }
    }

    /// Nothing is left behind: the step succeeded or had nothing to do
    pub fn is_clean(&self) -> bool {
        self.status != CleanupStatus::Error
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRuleCleanup {
    pub dispatch_rule_id: String,
    pub external_id: Option<String>,
    pub gateway_cleanup: CleanupStep,
    pub db_cleanup: CleanupStep,
}

impl DispatchRuleCleanup {
    pub fn is_clean(&self) -> bool {
        self.gateway_cleanup.is_clean() && self.db_cleanup.is_clean()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRuleCleanupReport {
    pub total_rules: usize,
    pub successful_cleanups: usize,
    pub results: Vec<DispatchRuleCleanup>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrunkCleanup {
    pub trunk_id: String,
    pub external_id: Option<String>,
    pub gateway_cleanup: CleanupStep,
}

/// Everything teardown attempted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    pub campaign_id: String,
    pub dispatch_rule_cleanup: DispatchRuleCleanupReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trunk_cleanup: Option<TrunkCleanup>,
    /// Numbers whose campaign reference was cleared
    pub released_phone_numbers: Vec<String>,
}
