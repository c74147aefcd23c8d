//! Agent records and their health fields

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

use super::{decode_json, DatabaseManager};
use crate::types::{new_id, Agent, AgentStatus, DeploymentOptions, HealthRecord};

const AGENT_COLUMNS: &str = "id, tenant_id, name, status, last_heartbeat, runtime_status, metrics, \
                             deployment, created_at, updated_at";

impl Agent {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let metrics: Option<String> = row.try_get("metrics")?;
        let deployment: Option<String> = row.try_get("deployment")?;

        Ok(Agent {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            status: AgentStatus::from_str(&status).ok_or_else(|| anyhow!("Unknown agent status: {}", status))?,
            health: HealthRecord {
                last_heartbeat: row.try_get("last_heartbeat")?,
                runtime_status: row.try_get("runtime_status")?,
                metrics: decode_json(metrics)?.unwrap_or_default(),
            },
            deployment: decode_json::<DeploymentOptions>(deployment)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl DatabaseManager {
    /// Register a new agent; it starts INACTIVE with no heartbeat
    pub async fn create_agent(&self, tenant_id: &str, name: &str) -> Result<Agent> {
        let now = Utc::now();
        let id = new_id();

        sqlx::query(
            "INSERT INTO agents (id, tenant_id, name, status, metrics, created_at, updated_at)
             VALUES (?, ?, ?, 'INACTIVE', '{}', ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(agent_id = %id, tenant_id, "Agent registered");
        self.get_agent(&id)
            .await?
            .ok_or_else(|| anyhow!("Agent {} vanished after insert", id))
    }

    /// Fetch a single agent
    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query(&format!("SELECT {} FROM agents WHERE id = ?", AGENT_COLUMNS))
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Agent::from_row).transpose()
    }

    /// List a tenant's agents, oldest first
    pub async fn list_agents(&self, tenant_id: &str) -> Result<Vec<Agent>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE tenant_id = ? ORDER BY created_at ASC, rowid ASC",
            AGENT_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Agent::from_row).collect()
    }

    /// Fetch the agents among `agent_ids` that exist, in no particular order
    pub async fn get_agents_by_ids(&self, agent_ids: &[String]) -> Result<Vec<Agent>> {
        if agent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM agents WHERE id IN (", AGENT_COLUMNS));
        let mut separated = query.separated(", ");
        for id in agent_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Agent::from_row).collect()
    }

    /// All agents currently persisted with `status`, across tenants
    pub async fn list_agents_by_status(&self, status: AgentStatus) -> Result<Vec<Agent>> {
        let rows = sqlx::query(&format!("SELECT {} FROM agents WHERE status = ?", AGENT_COLUMNS))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Agent::from_row).collect()
    }

    /// Write a heartbeat. Metrics are replaced when supplied and kept otherwise;
    /// the same goes for the runtime status.
    ///
    /// Returns false if the agent does not exist.
    pub async fn record_heartbeat(
        &self,
        agent_id: &str,
        at: DateTime<Utc>,
        status: AgentStatus,
        runtime_status: Option<&str>,
        metrics: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<bool> {
        let metrics_json = metrics.map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            "UPDATE agents SET
                status = ?,
                last_heartbeat = ?,
                runtime_status = COALESCE(?, runtime_status),
                metrics = COALESCE(?, metrics),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(at)
        .bind(runtime_status)
        .bind(metrics_json)
        .bind(at)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        debug!(agent_id, status = status.as_str(), "Heartbeat recorded");
        Ok(result.rows_affected() > 0)
    }

    /// Force an agent ACTIVE and seed its health record
    pub async fn deploy_agent(
        &self,
        agent_id: &str,
        at: DateTime<Utc>,
        runtime_status: &str,
        options: &DeploymentOptions,
    ) -> Result<bool> {
        let deployment = serde_json::to_string(options)?;

        let result = sqlx::query(
            "UPDATE agents SET
                status = 'ACTIVE',
                last_heartbeat = ?,
                runtime_status = ?,
                deployment = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(at)
        .bind(runtime_status)
        .bind(deployment)
        .bind(at)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Demote an ACTIVE agent to INACTIVE, but only if its heartbeat is still
    /// the one that was judged stale. A heartbeat landing in between wins.
    pub async fn demote_agent_if_unchanged(
        &self,
        agent_id: &str,
        observed_heartbeat: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agents SET status = 'INACTIVE', updated_at = ?
             WHERE id = ? AND status = 'ACTIVE' AND last_heartbeat IS ?",
        )
        .bind(now)
        .bind(agent_id)
        .bind(observed_heartbeat)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
