//! # Campaign Engine
//!
//! Agent liveness tracking and SIP telephony provisioning for rvoip calling
//! campaigns.
//!
//! This crate provides:
//! - An agent liveness tracker fed by heartbeats, with on-read staleness
//!   demotion and a background sweep
//! - Campaign provisioning: an upstream SIP trunk and a dispatch rule per
//!   campaign, created, updated and torn down through a
//!   [`gateway::TelephonyGateway`]
//! - Phone number reconciliation keeping each campaign's numbers and its
//!   inbound trunk's registered numbers in sync
//! - A SQLite resource registry and a REST API over all of the above
//!
//! ## Partial success
//!
//! Validation failures reject a request before anything is written. Once
//! validation has passed, gateway failures never fail the request: each
//! gateway-backed step is reported as a [`provisioning::Outcome`] next to
//! whatever did succeed, and nothing is retried automatically.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use rvoip_campaign_engine::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let config = CampaignEngineConfig::load(None)?;
//! let mut server = CampaignServerBuilder::new().with_config(config).build().await?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod provisioning;
pub mod server;
pub mod types;

pub use error::{CampaignError, Result};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::agent::{LivenessSweeper, LivenessTracker};
    pub use crate::api::{create_router, ApiState};
    pub use crate::config::{CampaignEngineConfig, GatewayMode};
    pub use crate::database::DatabaseManager;
    pub use crate::error::{CampaignError, Result};
    pub use crate::gateway::{GatewayError, HttpTelephonyGateway, InMemoryGateway, TelephonyGateway};
    pub use crate::provisioning::{
        CampaignRequest, CampaignUpdate, Outcome, PhoneNumberReconciler, PlatformTrunkSelector,
        ProvisioningOrchestrator,
    };
    pub use crate::server::{CampaignServer, CampaignServerBuilder};
    pub use crate::types::{Agent, AgentStatus, Campaign, CampaignType, PhoneNumber, Trunk};
}
