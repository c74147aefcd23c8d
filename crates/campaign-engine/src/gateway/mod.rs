//! Telephony gateway capability
//!
//! The gateway is the remote SIP provisioning API that owns trunks and
//! dispatch rules. Every call can fail on its own and can be slow; callers
//! wrap each one in [`bounded`] and turn a failure into a reported outcome
//! rather than aborting.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;
pub mod memory;

pub use http::HttpTelephonyGateway;
pub use memory::InMemoryGateway;

/// Gateway call failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Gateway call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode gateway response: {0}")]
    Decode(String),

    #[error("Gateway authentication error: {0}")]
    Auth(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Options for inbound trunk creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTrunkOptions {
    pub krisp_enabled: bool,
}

/// Options for outbound trunk creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundTrunkOptions {
    pub krisp_enabled: bool,
    pub transport: String,
}

/// Desired state of a dispatch rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRuleConfig {
    pub name: String,
    pub agent_name: String,
    pub room_name: String,
    pub trunk_ids: Vec<String>,
    pub metadata: serde_json::Value,
}

/// Operations exposed by a gateway, used for failure injection and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    CreateInboundTrunk,
    CreateOutboundTrunk,
    UpdateInboundTrunkNumbers,
    DeleteTrunk,
    CreateDispatchRule,
    UpdateDispatchRule,
    DeleteDispatchRule,
}

impl GatewayOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOperation::CreateInboundTrunk => "create_inbound_trunk",
            GatewayOperation::CreateOutboundTrunk => "create_outbound_trunk",
            GatewayOperation::UpdateInboundTrunkNumbers => "update_inbound_trunk_numbers",
            GatewayOperation::DeleteTrunk => "delete_trunk",
            GatewayOperation::CreateDispatchRule => "create_dispatch_rule",
            GatewayOperation::UpdateDispatchRule => "update_dispatch_rule",
            GatewayOperation::DeleteDispatchRule => "delete_dispatch_rule",
        }
    }
}

/// Remote SIP trunk / dispatch rule provisioning API
///
/// Ids taken and returned are the gateway's own (`externalId` locally).
#[async_trait]
pub trait TelephonyGateway: Send + Sync {
    /// Create an inbound trunk accepting calls to `numbers`
    async fn create_inbound_trunk(
        &self,
        name: &str,
        numbers: &[String],
        options: &InboundTrunkOptions,
    ) -> GatewayResult<String>;

    /// Create an outbound trunk dialing out through `upstream_host`
    async fn create_outbound_trunk(
        &self,
        name: &str,
        upstream_host: &str,
        numbers: &[String],
        options: &OutboundTrunkOptions,
    ) -> GatewayResult<String>;

    /// Replace the full number set registered on an inbound trunk
    async fn update_inbound_trunk_numbers(&self, trunk_id: &str, numbers: &[String]) -> GatewayResult<String>;

    async fn delete_trunk(&self, trunk_id: &str) -> GatewayResult<()>;

    async fn create_dispatch_rule(&self, config: &DispatchRuleConfig) -> GatewayResult<String>;

    async fn update_dispatch_rule(&self, rule_id: &str, config: &DispatchRuleConfig) -> GatewayResult<String>;

    async fn delete_dispatch_rule(&self, rule_id: &str) -> GatewayResult<()>;
}

/// Run a gateway call with a deadline; expiry is reported as
/// [`GatewayError::Timeout`]
pub async fn bounded<T, F>(timeout: Duration, call: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out_slow_calls() {
        let result: GatewayResult<String> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("ST_late".to_string())
        })
        .await;
        assert_eq!(result, Err(GatewayError::Timeout(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through_errors() {
        let result: GatewayResult<()> = bounded(Duration::from_secs(1), async {
            Err(GatewayError::Rejected {
                status: 400,
                message: "bad number".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(GatewayError::Rejected { status: 400, .. })));
    }
}
