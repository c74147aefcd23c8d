//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rvoip_campaign_engine::agent::LivenessTracker;
use rvoip_campaign_engine::api::{create_router, ApiState};
use rvoip_campaign_engine::config::{CampaignEngineConfig, GatewayMode};
use rvoip_campaign_engine::database::DatabaseManager;
use rvoip_campaign_engine::gateway::InMemoryGateway;
use rvoip_campaign_engine::provisioning::{
    LatestActivePlatformTrunk, PlatformTrunkSelector, ProvisioningOrchestrator, StaticPlatformTrunk,
};
use rvoip_campaign_engine::types::{Agent, PhoneNumber, PlatformTrunk};

pub const TENANT: &str = "tenant-a";
pub const OTHER_TENANT: &str = "tenant-b";

pub fn test_config() -> CampaignEngineConfig {
    let mut config = CampaignEngineConfig::default();
    config.server.bind_address = "127.0.0.1:0".to_string();
    config.server.default_tenant = TENANT.to_string();
    config.database.url = "sqlite::memory:".to_string();
    config.gateway.mode = GatewayMode::Memory;
    config.gateway.request_timeout_ms = 500;
    config.liveness.sweep_enabled = false;
    config
}

/// An orchestrator over an in-memory registry and gateway
pub struct Harness {
    pub config: CampaignEngineConfig,
    pub db: DatabaseManager,
    pub gateway: Arc<InMemoryGateway>,
    pub tracker: Arc<LivenessTracker>,
    pub orchestrator: Arc<ProvisioningOrchestrator>,
}

impl Harness {
    /// Harness whose platform trunk is the latest active one in the registry;
    /// one is seeded
    pub async fn new() -> Self {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        db.create_platform_trunk("carrier", "sip.carrier.example.com", true)
            .await
            .unwrap();
        let selector = Arc::new(LatestActivePlatformTrunk::new(db.clone()));
        Self::assemble(test_config(), db, selector)
    }

    /// Harness with no platform trunk available
    pub async fn without_platform_trunk() -> Self {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        Self::assemble(test_config(), db, Arc::new(StaticPlatformTrunk::none()))
    }

    pub fn assemble(
        config: CampaignEngineConfig,
        db: DatabaseManager,
        selector: Arc<dyn PlatformTrunkSelector>,
    ) -> Self {
        let gateway = Arc::new(InMemoryGateway::new());
        let tracker = Arc::new(LivenessTracker::new(db.clone(), config.liveness.stale_threshold()));
        let orchestrator = Arc::new(ProvisioningOrchestrator::new(
            db.clone(),
            gateway.clone(),
            tracker.clone(),
            selector,
            &config,
        ));

        Self {
            config,
            db,
            gateway,
            tracker,
            orchestrator,
        }
    }

    pub fn router(&self) -> axum::Router {
        let state = ApiState::new(
            self.db.clone(),
            self.tracker.clone(),
            self.orchestrator.clone(),
            self.config.server.default_tenant.as_str(),
        );
        create_router(state)
    }

    /// A deployed, therefore ACTIVE, agent
    pub async fn active_agent(&self, name: &str) -> Agent {
        let agent = self.db.create_agent(TENANT, name).await.unwrap();
        self.tracker.deploy(&agent.id, &Default::default()).await.unwrap()
    }

    /// A registered agent that never heartbeated
    pub async fn inactive_agent(&self, name: &str) -> Agent {
        self.db.create_agent(TENANT, name).await.unwrap()
    }

    pub async fn phone_number(&self, number: &str) -> PhoneNumber {
        self.db.create_phone_number(TENANT, number).await.unwrap().unwrap()
    }

    pub async fn platform_trunk(&self) -> PlatformTrunk {
        self.db.latest_active_platform_trunk().await.unwrap().unwrap()
    }
}

/// Stale threshold used by the liveness tests
pub fn threshold() -> Duration {
    test_config().liveness.stale_threshold()
}
