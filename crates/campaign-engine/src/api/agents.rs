use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{optional_json, ApiState, TenantContext};
use crate::agent::HeartbeatAck;
use crate::error::CampaignError;
use crate::types::{Agent, DeploymentOptions, RUNTIME_STATUS_DEPLOYED};

#[derive(Debug, Deserialize)]
pub(super) struct CreateAgentBody {
    name: String,
}

/// Heartbeat as sent by the agent runtime
#[derive(Debug, Default, Deserialize)]
pub(super) struct HeartbeatBody {
    /// Runtime status, `STOPPED` when shutting down
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    metrics: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeployResponse {
    agent: Agent,
    deployment_status: String,
}

pub(super) async fn list_agents(
    State(state): State<ApiState>,
    tenant: TenantContext,
) -> Result<Json<Vec<Agent>>, CampaignError> {
    Ok(Json(state.tracker.list_agents(tenant.id()).await?))
}

pub(super) async fn create_agent(
    State(state): State<ApiState>,
    tenant: TenantContext,
    Json(body): Json<CreateAgentBody>,
) -> Result<(StatusCode, Json<Agent>), CampaignError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(CampaignError::invalid_input("agent name cannot be empty"));
    }

    let agent = state.db.create_agent(tenant.id(), name).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

pub(super) async fn get_agent(
    State(state): State<ApiState>,
    tenant: TenantContext,
    Path(id): Path<String>,
) -> Result<Json<Agent>, CampaignError> {
    let agent = state.tracker.get_agent(&id).await?;
    if agent.tenant_id != tenant.id() {
        return Err(CampaignError::not_found(format!("agent {}", id)));
    }
    Ok(Json(agent))
}

/// Agent processes are not tenant-aware; the agent id alone identifies them
pub(super) async fn heartbeat(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Result<Json<HeartbeatBody>, JsonRejection>,
) -> Result<Json<HeartbeatAck>, CampaignError> {
    let body = optional_json(body)?;
    let ack = state
        .tracker
        .record_heartbeat(&id, body.status.as_deref(), body.metrics.as_ref())
        .await?;
    Ok(Json(ack))
}

pub(super) async fn deploy_agent(
    State(state): State<ApiState>,
    tenant: TenantContext,
    Path(id): Path<String>,
    options: Result<Json<DeploymentOptions>, JsonRejection>,
) -> Result<Json<DeployResponse>, CampaignError> {
    let options = optional_json(options)?;
    let existing = state.tracker.get_agent(&id).await?;
    if existing.tenant_id != tenant.id() {
        return Err(CampaignError::not_found(format!("agent {}", id)));
    }

    let agent = state.tracker.deploy(&id, &options).await?;
    let deployment_status = agent
        .health
        .runtime_status
        .clone()
        .unwrap_or_else(|| RUNTIME_STATUS_DEPLOYED.to_string());

    Ok(Json(DeployResponse {
        agent,
        deployment_status,
    }))
}
