use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CampaignError, Result};
use crate::logging::LoggingConfig;

/// Prefix for environment overrides, e.g. `CAMPAIGN_ENGINE__GATEWAY__BASE_URL`
pub const ENV_PREFIX: &str = "CAMPAIGN_ENGINE";

/// Campaign engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignEngineConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Agent liveness configuration
    pub liveness: LivenessConfig,

    /// Telephony gateway configuration
    pub gateway: GatewayConfig,

    /// Trunk and dispatch-rule provisioning settings
    pub provisioning: ProvisioningConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the REST API listens on
    pub bind_address: String,

    /// Tenant assumed when a request carries no `x-tenant-id` header
    pub default_tenant: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL (`sqlite::memory:` for an in-memory registry)
    pub url: String,

    /// Maximum pooled connections for file-backed databases
    pub max_connections: u32,

    /// SQLite busy timeout (milliseconds)
    pub busy_timeout_ms: u64,
}

/// Agent liveness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Heartbeat age after which an ACTIVE agent is demoted (milliseconds)
    pub stale_threshold_ms: u64,

    /// Cadence agents are expected to heartbeat at (milliseconds)
    pub expected_heartbeat_interval_ms: u64,

    /// Run the background staleness sweep
    pub sweep_enabled: bool,

    /// Interval between sweeps (milliseconds)
    pub sweep_interval_ms: u64,
}

/// Which gateway implementation the server wires in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// Remote SIP provisioning API over HTTP
    Http,
    /// In-process gateway, for local development
    Memory,
}

/// Telephony gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub mode: GatewayMode,

    /// Base URL of the provisioning API
    pub base_url: String,

    /// API key used as the token issuer
    pub api_key: String,

    /// API secret used to sign access tokens
    #[serde(skip_serializing)]
    pub api_secret: String,

    /// Per-call timeout (milliseconds)
    pub request_timeout_ms: u64,

    /// Lifetime of generated access tokens (seconds)
    pub token_ttl_secs: u64,
}

/// Provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Number registered on trunks that have no real numbers; inbound trunks
    /// cannot be created upstream with an empty number set
    pub placeholder_number: String,

    /// Prefix of the room name a campaign's calls are dispatched into
    pub room_prefix: String,

    /// Enable noise cancellation on provisioned trunks
    pub krisp_enabled: bool,

    /// SIP transport for outbound trunks (`udp`, `tcp` or `tls`)
    pub outbound_transport: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3026".to_string(),
            default_tenant: "default".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://campaigns.db?mode=rwc".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            stale_threshold_ms: 90_000,
            expected_heartbeat_interval_ms: 30_000,
            sweep_enabled: true,
            sweep_interval_ms: 30_000,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Http,
            base_url: "http://localhost:7880".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            request_timeout_ms: 10_000,
            token_ttl_secs: 600,
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            placeholder_number: "+15555555555".to_string(),
            room_prefix: "room-".to_string(),
            krisp_enabled: true,
            outbound_transport: "udp".to_string(),
        }
    }
}

impl LivenessConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl CampaignEngineConfig {
    /// Load configuration: defaults, then the optional file, then environment
    /// variables prefixed with [`ENV_PREFIX`]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| CampaignError::config(format!("Failed to build defaults: {}", e)))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CampaignError::config(format!("Failed to load configuration: {}", e)))?;

        loaded.validate().map_err(CampaignError::Config)?;
        Ok(loaded)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", self.server.bind_address));
        }

        if self.server.default_tenant.is_empty() {
            return Err("default_tenant cannot be empty".to_string());
        }

        if self.database.url.is_empty() {
            return Err("database url cannot be empty".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }

        if self.liveness.stale_threshold_ms == 0 {
            return Err("stale_threshold_ms must be greater than 0".to_string());
        }

        if self.liveness.expected_heartbeat_interval_ms > self.liveness.stale_threshold_ms {
            return Err(format!(
                "expected_heartbeat_interval_ms ({}) cannot exceed stale_threshold_ms ({})",
                self.liveness.expected_heartbeat_interval_ms, self.liveness.stale_threshold_ms
            ));
        }

        if self.liveness.sweep_enabled && self.liveness.sweep_interval_ms == 0 {
            return Err("sweep_interval_ms must be greater than 0 when the sweep is enabled".to_string());
        }

        if self.gateway.request_timeout_ms == 0 {
            return Err("gateway request_timeout_ms must be greater than 0".to_string());
        }

        if self.gateway.mode == GatewayMode::Http {
            if !(self.gateway.base_url.starts_with("http://") || self.gateway.base_url.starts_with("https://")) {
                return Err(format!("Invalid gateway base_url: {}", self.gateway.base_url));
            }
            if self.gateway.token_ttl_secs == 0 {
                return Err("gateway token_ttl_secs must be greater than 0".to_string());
            }
        }

        if !crate::types::is_e164(&self.provisioning.placeholder_number) {
            return Err(format!(
                "placeholder_number must be E.164: {}",
                self.provisioning.placeholder_number
            ));
        }

        match self.provisioning.outbound_transport.as_str() {
            "udp" | "tcp" | "tls" => {}
            other => return Err(format!("Unsupported outbound transport: {}", other)),
        }

        Ok(())
    }
}
