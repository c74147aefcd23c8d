//! REST API for the campaign engine
//!
//! Routes are thin: they resolve the tenant, call into the
//! [`LivenessTracker`], the [`ProvisioningOrchestrator`] or the registry,
//! and serialize whatever comes back. Gateway failures never surface here
//! as error statuses; they are already folded into the result payloads.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::agent::LivenessTracker;
use crate::database::DatabaseManager;
use crate::error::CampaignError;
use crate::provisioning::ProvisioningOrchestrator;

mod agents;
mod campaigns;
mod inventory;

/// Header carrying the caller's tenant
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Shared state for all handlers
#[derive(Clone)]
pub struct ApiState {
    pub db: DatabaseManager,
    pub tracker: Arc<LivenessTracker>,
    pub orchestrator: Arc<ProvisioningOrchestrator>,
    /// Tenant assumed when a request carries no tenant header
    pub default_tenant: Arc<str>,
}

impl ApiState {
    pub fn new(
        db: DatabaseManager,
        tracker: Arc<LivenessTracker>,
        orchestrator: Arc<ProvisioningOrchestrator>,
        default_tenant: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            db,
            tracker,
            orchestrator,
            default_tenant: default_tenant.into(),
        }
    }
}

/// Tenant a request acts on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext(pub String);

impl TenantContext {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<ApiState> for TenantContext {
    type Rejection = CampaignError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        match parts.headers.get(TENANT_HEADER) {
            None => Ok(TenantContext(state.default_tenant.to_string())),
            Some(value) => {
                let tenant = value
                    .to_str()
                    .map_err(|_| CampaignError::invalid_input(format!("{} must be valid UTF-8", TENANT_HEADER)))?
                    .trim();
                if tenant.is_empty() {
                    return Err(CampaignError::invalid_input(format!("{} cannot be empty", TENANT_HEADER)));
                }
                Ok(TenantContext(tenant.to_string()))
            }
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_ids: Option<Vec<String>>,
}

impl IntoResponse for CampaignError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code, invalid_ids, requested_ids) = match self {
            CampaignError::InvalidReferences {
                invalid_ids,
                requested_ids,
                ..
            } => (StatusCode::BAD_REQUEST, "INVALID_REFERENCES", Some(invalid_ids), Some(requested_ids)),
            CampaignError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", None, None),
            CampaignError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None, None),
            CampaignError::AlreadyExists(_) => (StatusCode::CONFLICT, "ALREADY_EXISTS", None, None),
            _ => {
                error!("Request failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None, None)
            }
        };

        let body = ErrorResponse {
            error: code.to_string(),
            message,
            invalid_ids,
            requested_ids,
        };
        (status, Json(body)).into_response()
    }
}

/// Body that may be omitted entirely
///
/// A request without a JSON content type gets `T::default()`. A JSON body
/// that does not parse or has the wrong shape is rejected.
pub(crate) fn optional_json<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, CampaignError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(CampaignError::invalid_input(rejection.body_text())),
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

async fn health_check(State(state): State<ApiState>) -> Response {
    match state.db.health_check().await {
        Ok(()) => Json(HealthResponse {
            status: "healthy",
            database: "ok",
        })
        .into_response(),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                    database: "unavailable",
                }),
            )
                .into_response()
        }
    }
}

/// Create the REST API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        // Campaigns
        .route("/campaigns", post(campaigns::create_campaign))
        .route(
            "/campaigns/:id",
            get(campaigns::get_campaign)
                .put(campaigns::update_campaign)
                .delete(campaigns::delete_campaign),
        )
        .route("/campaigns/:id/phone-numbers", put(campaigns::assign_phone_numbers))
        // Agents
        .route("/agents", get(agents::list_agents).post(agents::create_agent))
        .route("/agents/:id", get(agents::get_agent))
        .route("/agents/:id/heartbeat", post(agents::heartbeat))
        .route("/agents/:id/deploy", post(agents::deploy_agent))
        // Inventory
        .route(
            "/phone-numbers",
            get(inventory::list_phone_numbers).post(inventory::create_phone_number),
        )
        .route(
            "/platform-trunks",
            get(inventory::list_platform_trunks).post(inventory::create_platform_trunk),
        )
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
