//! # Resource Registry (sqlx + SQLite)
//!
//! Persistent records for agents, campaigns, phone numbers, trunks and
//! dispatch rules. Referential rules live in the schema
//! (`migrations/`): deleting a campaign cascades to its agent links,
//! trunk and dispatch rules, and releases its phone numbers
//! (`ON DELETE SET NULL`).
//!
//! Multi-row writes that must land together run inside a single
//! transaction per sub-step. No transaction is ever held across a gateway
//! call.
//!
//! ```rust
//! use rvoip_campaign_engine::database::DatabaseManager;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let db = DatabaseManager::new_in_memory().await?;
//! let agent = db.create_agent("tenant-1", "Appointment Setter").await?;
//! assert!(db.get_agent(&agent.id).await?.is_some());
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::config::DatabaseConfig;

pub mod agents;
pub mod campaigns;
pub mod phone_numbers;
pub mod trunks;

pub use campaigns::NewCampaign;
pub use phone_numbers::{AssignmentDelta, NumberMove};
pub use trunks::DispatchRuleRecord;

// Re-export commonly used types
pub use sqlx;

/// Main database manager using sqlx for async operations
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Create a database manager for `database_url` with default pool settings
    pub async fn new(database_url: &str) -> Result<Self> {
        let config = DatabaseConfig {
            url: database_url.to_string(),
            ..DatabaseConfig::default()
        };
        Self::connect(&config).await
    }

    /// Create a database manager and run migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Initializing registry database: {}", config.url);

        let pool = if config.url.contains(":memory:") {
            // Every new connection to `sqlite::memory:` is a fresh database, so
            // pin exactly one connection for the life of the pool.
            let options = SqliteConnectOptions::from_str(&config.url)?.foreign_keys(true);
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(|e| anyhow!("Failed to open in-memory database: {}", e))?
        } else {
            let options = SqliteConnectOptions::from_str(&config.url)?
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
                .foreign_keys(true)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options)
                .await
                .map_err(|e| anyhow!("Failed to connect to database: {}", e))?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;

        info!("✅ Registry database ready");
        Ok(Self { pool })
    }

    /// Create an in-memory database for testing
    pub async fn new_in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a new database transaction
    pub async fn begin_transaction(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| anyhow!("Failed to start transaction: {}", e))
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        debug!("Database health check passed");
        Ok(())
    }
}

/// Decode a JSON text column, treating NULL as absent
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    match raw {
        Some(text) if !text.is_empty() => Ok(Some(serde_json::from_str(&text)?)),
        _ => Ok(None),
    }
}
