use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{ApiState, TenantContext};
use crate::error::CampaignError;
use crate::provisioning::{
    CampaignDetails, CampaignRequest, CampaignUpdate, ProvisioningResult, ReconciliationResult, TeardownReport,
    UpdateResult,
};
use crate::types::CampaignType;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateCampaignBody {
    name: String,
    #[serde(default)]
    description: Option<String>,
    campaign_type: CampaignType,
    #[serde(default)]
    agent_ids: Vec<String>,
    #[serde(default)]
    number_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UpdateCampaignBody {
    name: Option<String>,
    description: Option<String>,
    agent_name: Option<String>,
    agent_ids: Option<Vec<String>>,
    number_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AssignNumbersBody {
    number_ids: Vec<String>,
}

/// 201 even when the trunk or dispatch rule failed; see the per-step outcomes
pub(super) async fn create_campaign(
    State(state): State<ApiState>,
    tenant: TenantContext,
    Json(body): Json<CreateCampaignBody>,
) -> Result<(StatusCode, Json<ProvisioningResult>), CampaignError> {
    let result = state
        .orchestrator
        .provision(CampaignRequest {
            tenant_id: tenant.0,
            name: body.name,
            description: body.description,
            campaign_type: body.campaign_type,
            agent_ids: body.agent_ids,
            phone_number_ids: body.number_ids,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

pub(super) async fn get_campaign(
    State(state): State<ApiState>,
    tenant: TenantContext,
    Path(id): Path<String>,
) -> Result<Json<CampaignDetails>, CampaignError> {
    Ok(Json(state.orchestrator.describe(tenant.id(), &id).await?))
}

pub(super) async fn update_campaign(
    State(state): State<ApiState>,
    tenant: TenantContext,
    Path(id): Path<String>,
    Json(body): Json<UpdateCampaignBody>,
) -> Result<Json<UpdateResult>, CampaignError> {
    let update = CampaignUpdate {
        name: body.name,
        description: body.description,
        agent_name: body.agent_name,
        agent_ids: body.agent_ids,
        phone_number_ids: body.number_ids,
    };

    Ok(Json(state.orchestrator.update(tenant.id(), &id, update).await?))
}

pub(super) async fn delete_campaign(
    State(state): State<ApiState>,
    tenant: TenantContext,
    Path(id): Path<String>,
) -> Result<Json<TeardownReport>, CampaignError> {
    Ok(Json(state.orchestrator.teardown(tenant.id(), &id).await?))
}

pub(super) async fn assign_phone_numbers(
    State(state): State<ApiState>,
    tenant: TenantContext,
    Path(id): Path<String>,
    Json(body): Json<AssignNumbersBody>,
) -> Result<Json<ReconciliationResult>, CampaignError> {
    let result = state
        .orchestrator
        .reconciler()
        .reconcile_assignment(tenant.id(), &id, &body.number_ids)
        .await?;

    Ok(Json(result))
}
