//! HTTP gateway client for a LiveKit-compatible SIP service
//!
//! Requests are Twirp JSON calls (`POST {base}/twirp/livekit.SIP/<Method>`)
//! authenticated with a short-lived HS256 access token carrying SIP admin
//! grants.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{
    DispatchRuleConfig, GatewayError, GatewayOperation, GatewayResult, InboundTrunkOptions, OutboundTrunkOptions,
    TelephonyGateway,
};
use crate::config::GatewayConfig;

const SIP_SERVICE: &str = "twirp/livekit.SIP";

#[derive(Debug, Serialize)]
struct SipGrant {
    admin: bool,
    call: bool,
}

#[derive(Debug, Serialize)]
struct AccessClaims {
    iss: String,
    nbf: u64,
    exp: u64,
    sip: SipGrant,
}

#[derive(Debug, Deserialize)]
struct TrunkInfo {
    sip_trunk_id: String,
}

#[derive(Debug, Deserialize)]
struct DispatchRuleInfo {
    sip_dispatch_rule_id: String,
}

#[derive(Debug, Deserialize)]
struct TwirpError {
    #[serde(default)]
    msg: String,
}

/// Telephony gateway backed by the remote SIP provisioning API
pub struct HttpTelephonyGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    encoding_key: EncodingKey,
    token_ttl: Duration,
    request_timeout: Duration,
}

impl HttpTelephonyGateway {
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(GatewayError::Auth("api_key and api_secret are required".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            encoding_key: EncodingKey::from_secret(config.api_secret.as_bytes()),
            token_ttl: Duration::from_secs(config.token_ttl_secs),
            request_timeout: config.request_timeout(),
        })
    }

    fn access_token(&self) -> GatewayResult<String> {
        let now = chrono::Utc::now().timestamp() as u64;
        let claims = AccessClaims {
            iss: self.api_key.clone(),
            nbf: now,
            exp: now + self.token_ttl.as_secs(),
            sip: SipGrant { admin: true, call: true },
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| GatewayError::Auth(format!("Failed to sign access token: {}", e)))
    }

    async fn call<Req, Resp>(&self, operation: GatewayOperation, method: &str, body: &Req) -> GatewayResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}/{}", self.base_url, SIP_SERVICE, method);
        let token = self.access_token()?;
        debug!(operation = operation.as_str(), %url, "Calling telephony gateway");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.request_timeout)
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TwirpError>(&text)
                .ok()
                .map(|e| e.msg)
                .filter(|m| !m.is_empty())
                .unwrap_or(text);
            warn!(operation = operation.as_str(), status = status.as_u16(), "Gateway rejected request: {}", message);
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

fn sip_transport(transport: &str) -> &'static str {
    match transport {
        "tcp" => "SIP_TRANSPORT_TCP",
        "tls" => "SIP_TRANSPORT_TLS",
        "udp" => "SIP_TRANSPORT_UDP",
        _ => "SIP_TRANSPORT_AUTO",
    }
}

fn dispatch_rule_body(config: &DispatchRuleConfig) -> serde_json::Value {
    json!({
        "name": config.name,
        "trunk_ids": config.trunk_ids,
        "metadata": config.metadata.to_string(),
        "rule": {
            "dispatch_rule_direct": { "room_name": config.room_name }
        },
        "room_config": {
            "agents": [{ "agent_name": config.agent_name }]
        }
    })
}

#[async_trait]
impl TelephonyGateway for HttpTelephonyGateway {
    async fn create_inbound_trunk(
        &self,
        name: &str,
        numbers: &[String],
        options: &InboundTrunkOptions,
    ) -> GatewayResult<String> {
        let body = json!({
            "trunk": {
                "name": name,
                "numbers": numbers,
                "krisp_enabled": options.krisp_enabled,
            }
        });
        let info: TrunkInfo = self
            .call(GatewayOperation::CreateInboundTrunk, "CreateSIPInboundTrunk", &body)
            .await?;
        Ok(info.sip_trunk_id)
    }

    async fn create_outbound_trunk(
        &self,
        name: &str,
        upstream_host: &str,
        numbers: &[String],
        options: &OutboundTrunkOptions,
    ) -> GatewayResult<String> {
        let body = json!({
            "trunk": {
                "name": name,
                "address": upstream_host,
                "numbers": numbers,
                "transport": sip_transport(&options.transport),
                "krisp_enabled": options.krisp_enabled,
            }
        });
        let info: TrunkInfo = self
            .call(GatewayOperation::CreateOutboundTrunk, "CreateSIPOutboundTrunk", &body)
            .await?;
        Ok(info.sip_trunk_id)
    }

    async fn update_inbound_trunk_numbers(&self, trunk_id: &str, numbers: &[String]) -> GatewayResult<String> {
        let body = json!({
            "sip_trunk_id": trunk_id,
            "update": {
                "numbers": { "set": numbers }
            }
        });
        let info: TrunkInfo = self
            .call(GatewayOperation::UpdateInboundTrunkNumbers, "UpdateSIPInboundTrunk", &body)
            .await?;
        Ok(info.sip_trunk_id)
    }

    async fn delete_trunk(&self, trunk_id: &str) -> GatewayResult<()> {
        let body = json!({ "sip_trunk_id": trunk_id });
        let _: IgnoredAny = self
            .call(GatewayOperation::DeleteTrunk, "DeleteSIPTrunk", &body)
            .await?;
        Ok(())
    }

    async fn create_dispatch_rule(&self, config: &DispatchRuleConfig) -> GatewayResult<String> {
        let body = json!({ "dispatch_rule": dispatch_rule_body(config) });
        let info: DispatchRuleInfo = self
            .call(GatewayOperation::CreateDispatchRule, "CreateSIPDispatchRule", &body)
            .await?;
        Ok(info.sip_dispatch_rule_id)
    }

    async fn update_dispatch_rule(&self, rule_id: &str, config: &DispatchRuleConfig) -> GatewayResult<String> {
        let body = json!({
            "sip_dispatch_rule_id": rule_id,
            "replace": dispatch_rule_body(config),
        });
        let info: DispatchRuleInfo = self
            .call(GatewayOperation::UpdateDispatchRule, "UpdateSIPDispatchRule", &body)
            .await?;
        Ok(info.sip_dispatch_rule_id)
    }

    async fn delete_dispatch_rule(&self, rule_id: &str) -> GatewayResult<()> {
        let body = json!({ "sip_dispatch_rule_id": rule_id });
        let _: IgnoredAny = self
            .call(GatewayOperation::DeleteDispatchRule, "DeleteSIPDispatchRule", &body)
            .await?;
        Ok(())
    }
}
