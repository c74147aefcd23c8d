//! Phone number and platform trunk inventory

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::info;

use super::{ApiState, TenantContext};
use crate::error::CampaignError;
use crate::types::{is_e164, PhoneNumber, PlatformTrunk};

#[derive(Debug, Deserialize)]
pub(super) struct CreatePhoneNumberBody {
    number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreatePlatformTrunkBody {
    name: String,
    sip_host: String,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

pub(super) async fn list_phone_numbers(
    State(state): State<ApiState>,
    tenant: TenantContext,
) -> Result<Json<Vec<PhoneNumber>>, CampaignError> {
    Ok(Json(state.db.list_phone_numbers(tenant.id()).await?))
}

pub(super) async fn create_phone_number(
    State(state): State<ApiState>,
    tenant: TenantContext,
    Json(body): Json<CreatePhoneNumberBody>,
) -> Result<(StatusCode, Json<PhoneNumber>), CampaignError> {
    let number = body.number.trim();
    if !is_e164(number) {
        return Err(CampaignError::invalid_input(format!(
            "phone number must be in E.164 form: {}",
            number
        )));
    }

    let created = state
        .db
        .create_phone_number(tenant.id(), number)
        .await?
        .ok_or_else(|| CampaignError::already_exists(format!("phone number {}", number)))?;

    info!(tenant_id = tenant.id(), number, "📞 Phone number added");
    Ok((StatusCode::CREATED, Json(created)))
}

pub(super) async fn list_platform_trunks(
    State(state): State<ApiState>,
) -> Result<Json<Vec<PlatformTrunk>>, CampaignError> {
    Ok(Json(state.db.list_platform_trunks().await?))
}

pub(super) async fn create_platform_trunk(
    State(state): State<ApiState>,
    Json(body): Json<CreatePlatformTrunkBody>,
) -> Result<(StatusCode, Json<PlatformTrunk>), CampaignError> {
    let name = body.name.trim();
    let sip_host = body.sip_host.trim();
    if name.is_empty() || sip_host.is_empty() {
        return Err(CampaignError::invalid_input("platform trunk name and sipHost are required"));
    }

    let trunk = state.db.create_platform_trunk(name, sip_host, body.is_active).await?;
    Ok((StatusCode::CREATED, Json(trunk)))
}
