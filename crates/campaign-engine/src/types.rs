//! Core records of the resource registry
//!
//! These are the shapes persisted by [`crate::database`] and returned by the
//! HTTP API. Enum values are stored and serialized in upper case
//! (`ACTIVE`, `INBOUND`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Runtime status reported by an agent process that is shutting down
pub const RUNTIME_STATUS_STOPPED: &str = "STOPPED";

/// Runtime status seeded by a deploy
pub const RUNTIME_STATUS_DEPLOYED: &str = "DEPLOYED";

/// Create a new record ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Agent status as persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Active,
    Inactive,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "ACTIVE",
            AgentStatus::Inactive => "INACTIVE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(AgentStatus::Active),
            "INACTIVE" => Some(AgentStatus::Inactive),
            _ => None,
        }
    }
}

/// Campaign direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignType {
    Inbound,
    Outbound,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::Inbound => "INBOUND",
            CampaignType::Outbound => "OUTBOUND",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INBOUND" => Some(CampaignType::Inbound),
            "OUTBOUND" => Some(CampaignType::Outbound),
            _ => None,
        }
    }

    /// The trunk direction a campaign of this type is provisioned with
    pub fn trunk_type(&self) -> TrunkType {
        match self {
            CampaignType::Inbound => TrunkType::Inbound,
            CampaignType::Outbound => TrunkType::Outbound,
        }
    }
}

/// Trunk direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrunkType {
    Inbound,
    Outbound,
}

impl TrunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrunkType::Inbound => "INBOUND",
            TrunkType::Outbound => "OUTBOUND",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INBOUND" => Some(TrunkType::Inbound),
            "OUTBOUND" => Some(TrunkType::Outbound),
            _ => None,
        }
    }
}

/// Locally cached trunk state
///
/// Trunk rows are only written once the gateway has returned an id, so
/// `Provisioning` is never produced by this crate; it is accepted when
/// reading rows written by other tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrunkStatus {
    Provisioning,
    Active,
    Failed,
}

impl TrunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrunkStatus::Provisioning => "PROVISIONING",
            TrunkStatus::Active => "ACTIVE",
            TrunkStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PROVISIONING" => Some(TrunkStatus::Provisioning),
            "ACTIVE" => Some(TrunkStatus::Active),
            "FAILED" => Some(TrunkStatus::Failed),
            _ => None,
        }
    }
}

/// Liveness data last reported by (or seeded for) an agent process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub runtime_status: Option<String>,
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

/// Options recorded when an agent is deployed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOptions {
    #[serde(default)]
    pub record_calls: bool,
    #[serde(default)]
    pub transcribe_realtime: bool,
}

/// AI agent record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub status: AgentStatus,
    pub health: HealthRecord,
    pub deployment: Option<DeploymentOptions>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Calling campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Campaign to agent association, lower priority wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignAgent {
    pub campaign_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub priority: i64,
    pub is_active: bool,
}

/// E.164 number owned by at most one campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    pub id: String,
    pub tenant_id: String,
    pub number: String,
    pub campaign_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Shared carrier-level trunk that campaign trunks hang off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformTrunk {
    pub id: String,
    pub name: String,
    pub sip_host: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Campaign trunk provisioned upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trunk {
    pub id: String,
    pub campaign_id: String,
    pub platform_trunk_id: String,
    pub trunk_type: TrunkType,
    pub external_id: Option<String>,
    pub status: TrunkStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Routing rule sending calls on a trunk to a named agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRule {
    pub id: String,
    pub campaign_id: String,
    pub trunk_id: String,
    pub external_id: Option<String>,
    pub name: String,
    pub agent_name: String,
    pub room_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Check that a number is in E.164 form (`+` then 8 to 15 digits)
pub fn is_e164(number: &str) -> bool {
    match number.strip_prefix('+') {
        Some(digits) => {
            (8..=15).contains(&digits.len())
                && digits.chars().all(|c| c.is_ascii_digit())
                && !digits.starts_with('0')
        }
        None => false,
    }
}
