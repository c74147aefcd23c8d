//! # Campaign Server
//!
//! Lifecycle management for a running campaign engine: it wires the registry
//! database, the telephony gateway, the liveness tracker and the
//! provisioning orchestrator together, serves the REST API, and runs the
//! background liveness sweep.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             CampaignServer              │
//! ├─────────────────────────────────────────┤
//! │       REST API (axum)  │  Sweeper       │
//! ├─────────────────────────────────────────┤
//! │  ProvisioningOrchestrator │ Liveness    │
//! ├─────────────────────────────────────────┤
//! │   Registry (sqlx)  │  TelephonyGateway  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use rvoip_campaign_engine::config::{CampaignEngineConfig, GatewayMode};
//! use rvoip_campaign_engine::server::CampaignServerBuilder;
//!
//! # async fn example() -> rvoip_campaign_engine::Result<()> {
//! let mut config = CampaignEngineConfig::default();
//! config.gateway.mode = GatewayMode::Memory;
//! config.database.url = "sqlite::memory:".to_string();
//!
//! let mut server = CampaignServerBuilder::new()
//!     .with_config(config)
//!     .build()
//!     .await?;
//!
//! server.start().await?;
//! println!("Listening on {:?}", server.local_addr());
//!
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::agent::{LivenessSweeper, LivenessTracker};
use crate::api::{create_router, ApiState};
use crate::config::{CampaignEngineConfig, GatewayMode};
use crate::database::DatabaseManager;
use crate::error::{CampaignError, Result};
use crate::gateway::{HttpTelephonyGateway, InMemoryGateway, TelephonyGateway};
use crate::provisioning::{LatestActivePlatformTrunk, PlatformTrunkSelector, ProvisioningOrchestrator};

/// A campaign engine with its HTTP API and background sweep
pub struct CampaignServer {
    config: CampaignEngineConfig,

    /// Handler state shared with the router
    state: ApiState,

    gateway: Arc<dyn TelephonyGateway>,

    sweeper: LivenessSweeper,

    /// Signals the HTTP server to shut down gracefully
    shutdown_tx: Option<oneshot::Sender<()>>,

    serve_handle: Option<JoinHandle<()>>,

    local_addr: Option<SocketAddr>,
}

impl CampaignServer {
    /// Assemble a server from already constructed parts
    pub fn new(
        config: CampaignEngineConfig,
        db: DatabaseManager,
        gateway: Arc<dyn TelephonyGateway>,
        selector: Arc<dyn PlatformTrunkSelector>,
    ) -> Self {
        let tracker = Arc::new(LivenessTracker::new(db.clone(), config.liveness.stale_threshold()));
        let orchestrator = Arc::new(ProvisioningOrchestrator::new(
            db.clone(),
            gateway.clone(),
            tracker.clone(),
            selector,
            &config,
        ));
        let sweeper = LivenessSweeper::new(tracker.clone(), config.liveness.sweep_interval());
        let state = ApiState::new(db, tracker, orchestrator, config.server.default_tenant.as_str());

        Self {
            config,
            state,
            gateway,
            sweeper,
            shutdown_tx: None,
            serve_handle: None,
            local_addr: None,
        }
    }

    /// Start the liveness sweep and begin serving the REST API
    pub async fn start(&mut self) -> Result<()> {
        if self.serve_handle.is_some() {
            return Err(CampaignError::internal("server is already running"));
        }

        if self.config.liveness.sweep_enabled {
            self.sweeper.start();
        } else {
            warn!("⚠️ Liveness sweep disabled, agents are only demoted when read");
        }

        let listener = TcpListener::bind(&self.config.server.bind_address)
            .await
            .map_err(|e| CampaignError::config(format!("Failed to bind {}: {}", self.config.server.bind_address, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| CampaignError::internal(format!("Failed to read listener address: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = self.router();
        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!("REST API server error: {}", e);
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.serve_handle = Some(handle);
        self.local_addr = Some(local_addr);

        info!("✅ Campaign engine REST API listening on http://{}", local_addr);
        Ok(())
    }

    /// Stop serving and stop the sweep
    pub async fn stop(&mut self) -> Result<()> {
        info!("🛑 Stopping campaign server...");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.serve_handle.take() {
            if let Err(e) = handle.await {
                warn!("REST API task ended abnormally: {}", e);
            }
        }
        self.sweeper.stop().await;
        self.local_addr = None;

        info!("✅ Campaign server stopped");
        Ok(())
    }

    /// A router over this server's state, for embedding or in-process tests
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Address the REST API is bound to while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.serve_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn config(&self) -> &CampaignEngineConfig {
        &self.config
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.state.db
    }

    pub fn gateway(&self) -> &Arc<dyn TelephonyGateway> {
        &self.gateway
    }

    pub fn tracker(&self) -> &Arc<LivenessTracker> {
        &self.state.tracker
    }

    pub fn orchestrator(&self) -> &Arc<ProvisioningOrchestrator> {
        &self.state.orchestrator
    }
}

/// Builder for CampaignServer with fluent API
#[derive(Default)]
pub struct CampaignServerBuilder {
    config: Option<CampaignEngineConfig>,
    db: Option<DatabaseManager>,
    gateway: Option<Arc<dyn TelephonyGateway>>,
    selector: Option<Arc<dyn PlatformTrunkSelector>>,
}

impl CampaignServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration; defaults are used otherwise
    pub fn with_config(mut self, config: CampaignEngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an existing database instead of connecting to `database.url`
    pub fn with_database(mut self, db: DatabaseManager) -> Self {
        self.db = Some(db);
        self
    }

    /// Use this gateway instead of the one selected by `gateway.mode`
    pub fn with_gateway(mut self, gateway: Arc<dyn TelephonyGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Replace the latest-active platform trunk policy
    pub fn with_platform_trunk_selector(mut self, selector: Arc<dyn PlatformTrunkSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Build the server
    pub async fn build(self) -> Result<CampaignServer> {
        let config = self.config.unwrap_or_default();
        config.validate().map_err(CampaignError::Config)?;

        let db = match self.db {
            Some(db) => db,
            None => DatabaseManager::connect(&config.database).await?,
        };

        let gateway: Arc<dyn TelephonyGateway> = match self.gateway {
            Some(gateway) => gateway,
            None => match config.gateway.mode {
                GatewayMode::Http => {
                    info!("🔌 Using SIP provisioning API at {}", config.gateway.base_url);
                    Arc::new(
                        HttpTelephonyGateway::new(&config.gateway)
                            .map_err(|e| CampaignError::config(e.to_string()))?,
                    )
                }
                GatewayMode::Memory => {
                    warn!("⚠️ Using the in-memory telephony gateway, nothing is provisioned upstream");
                    Arc::new(InMemoryGateway::new())
                }
            },
        };

        let selector = self
            .selector
            .unwrap_or_else(|| Arc::new(LatestActivePlatformTrunk::new(db.clone())));

        Ok(CampaignServer::new(config, db, gateway, selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> CampaignEngineConfig {
        let mut config = CampaignEngineConfig::default();
        config.server.bind_address = "127.0.0.1:0".to_string();
        config.database.url = "sqlite::memory:".to_string();
        config.gateway.mode = GatewayMode::Memory;
        config
    }

    #[tokio::test]
    async fn test_http_mode_requires_credentials() {
        let mut config = memory_config();
        config.gateway.mode = GatewayMode::Http;

        let result = CampaignServerBuilder::new().with_config(config).build().await;
        assert!(matches!(result, Err(CampaignError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_serves_health_and_stops() {
        let mut server = CampaignServerBuilder::new()
            .with_config(memory_config())
            .build()
            .await
            .unwrap();

        server.start().await.unwrap();
        assert!(server.is_running());
        let addr = server.local_addr().unwrap();

        let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "healthy");

        assert!(server.start().await.is_err());

        server.stop().await.unwrap();
        assert!(server.local_addr().is_none());
        assert!(!server.is_running());
    }
}
