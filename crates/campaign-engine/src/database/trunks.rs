//! Trunks, dispatch rules and the shared platform trunks they reference

use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::Row;
use tracing::info;

use super::DatabaseManager;
use crate::types::{new_id, DispatchRule, PlatformTrunk, Trunk, TrunkStatus, TrunkType};

const TRUNK_COLUMNS: &str = "id, campaign_id, platform_trunk_id, trunk_type, external_id, status, last_error, \
                             created_at, updated_at";
const DISPATCH_RULE_COLUMNS: &str = "id, campaign_id, trunk_id, external_id, name, agent_name, room_name, \
                                     created_at, updated_at";
const PLATFORM_TRUNK_COLUMNS: &str = "id, name, sip_host, is_active, created_at";

impl Trunk {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let trunk_type: String = row.try_get("trunk_type")?;
        let status: String = row.try_get("status")?;
        Ok(Trunk {
            id: row.try_get("id")?,
            campaign_id: row.try_get("campaign_id")?,
            platform_trunk_id: row.try_get("platform_trunk_id")?,
            trunk_type: TrunkType::from_str(&trunk_type).ok_or_else(|| anyhow!("Unknown trunk type: {}", trunk_type))?,
            external_id: row.try_get("external_id")?,
            status: TrunkStatus::from_str(&status).ok_or_else(|| anyhow!("Unknown trunk status: {}", status))?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl DispatchRule {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        Ok(DispatchRule {
            id: row.try_get("id")?,
            campaign_id: row.try_get("campaign_id")?,
            trunk_id: row.try_get("trunk_id")?,
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            agent_name: row.try_get("agent_name")?,
            room_name: row.try_get("room_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PlatformTrunk {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        Ok(PlatformTrunk {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            sip_host: row.try_get("sip_host")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Fields written when a dispatch rule is created or updated
#[derive(Debug, Clone)]
pub struct DispatchRuleRecord<'a> {
    pub external_id: Option<&'a str>,
    pub name: &'a str,
    pub agent_name: &'a str,
    pub room_name: &'a str,
}

// Trunk operations
impl DatabaseManager {
    /// Record a trunk the gateway has provisioned
    pub async fn insert_trunk(
        &self,
        campaign_id: &str,
        platform_trunk_id: &str,
        trunk_type: TrunkType,
        external_id: &str,
    ) -> Result<Trunk> {
        let now = Utc::now();
        let id = new_id();

        sqlx::query(
            "INSERT INTO trunks (id, campaign_id, platform_trunk_id, trunk_type, external_id, status, last_error, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'ACTIVE', NULL, ?, ?)",
        )
        .bind(&id)
        .bind(campaign_id)
        .bind(platform_trunk_id)
        .bind(trunk_type.as_str())
        .bind(external_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(campaign_id, trunk_id = %id, external_id, "📞 Trunk recorded");
        self.get_trunk(&id)
            .await?
            .ok_or_else(|| anyhow!("Trunk {} vanished after insert", id))
    }

    pub async fn get_trunk(&self, trunk_id: &str) -> Result<Option<Trunk>> {
        let row = sqlx::query(&format!("SELECT {} FROM trunks WHERE id = ?", TRUNK_COLUMNS))
            .bind(trunk_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Trunk::from_row).transpose()
    }

    /// The campaign's trunk, if one was provisioned
    pub async fn get_campaign_trunk(&self, campaign_id: &str) -> Result<Option<Trunk>> {
        let row = sqlx::query(&format!("SELECT {} FROM trunks WHERE campaign_id = ?", TRUNK_COLUMNS))
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Trunk::from_row).transpose()
    }

    /// Cache the outcome of the latest gateway call against a trunk
    pub async fn update_trunk_status(
        &self,
        trunk_id: &str,
        status: TrunkStatus,
        last_error: Option<&str>,
    ) -> Result<Option<Trunk>> {
        sqlx::query("UPDATE trunks SET status = ?, last_error = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(last_error)
            .bind(Utc::now())
            .bind(trunk_id)
            .execute(&self.pool)
            .await?;

        self.get_trunk(trunk_id).await
    }
}

// Dispatch rule operations
impl DatabaseManager {
    pub async fn insert_dispatch_rule(
        &self,
        campaign_id: &str,
        trunk_id: &str,
        record: &DispatchRuleRecord<'_>,
    ) -> Result<DispatchRule> {
        let now = Utc::now();
        let id = new_id();

        sqlx::query(
            "INSERT INTO dispatch_rules (id, campaign_id, trunk_id, external_id, name, agent_name, room_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(campaign_id)
        .bind(trunk_id)
        .bind(record.external_id)
        .bind(record.name)
        .bind(record.agent_name)
        .bind(record.room_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(campaign_id, dispatch_rule_id = %id, agent_name = record.agent_name, "🔀 Dispatch rule recorded");
        self.get_dispatch_rule(&id)
            .await?
            .ok_or_else(|| anyhow!("Dispatch rule {} vanished after insert", id))
    }

    pub async fn get_dispatch_rule(&self, rule_id: &str) -> Result<Option<DispatchRule>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM dispatch_rules WHERE id = ?",
            DISPATCH_RULE_COLUMNS
        ))
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(DispatchRule::from_row).transpose()
    }

    /// A campaign's dispatch rules, oldest first
    pub async fn list_campaign_dispatch_rules(&self, campaign_id: &str) -> Result<Vec<DispatchRule>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM dispatch_rules WHERE campaign_id = ? ORDER BY created_at ASC, rowid ASC",
            DISPATCH_RULE_COLUMNS
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(DispatchRule::from_row).collect()
    }

    /// Mirror an upstream dispatch rule update locally
    pub async fn update_dispatch_rule(&self, rule_id: &str, record: &DispatchRuleRecord<'_>) -> Result<Option<DispatchRule>> {
        sqlx::query(
            "UPDATE dispatch_rules SET
                external_id = COALESCE(?, external_id),
                name = ?,
                agent_name = ?,
                room_name = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(record.external_id)
        .bind(record.name)
        .bind(record.agent_name)
        .bind(record.room_name)
        .bind(Utc::now())
        .bind(rule_id)
        .execute(&self.pool)
        .await?;

        self.get_dispatch_rule(rule_id).await
    }

    pub async fn delete_dispatch_rule(&self, rule_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM dispatch_rules WHERE id = ?")
            .bind(rule_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// Platform trunk operations
impl DatabaseManager {
    pub async fn create_platform_trunk(&self, name: &str, sip_host: &str, is_active: bool) -> Result<PlatformTrunk> {
        let id = new_id();
        sqlx::query("INSERT INTO platform_trunks (id, name, sip_host, is_active, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(sip_host)
            .bind(is_active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        info!(platform_trunk_id = %id, sip_host, is_active, "Platform trunk added");
        let row = sqlx::query(&format!(
            "SELECT {} FROM platform_trunks WHERE id = ?",
            PLATFORM_TRUNK_COLUMNS
        ))
        .bind(&id)
        .fetch_one(&self.pool)
        .await?;
        PlatformTrunk::from_row(&row)
    }

    /// The most recently created active platform trunk
    pub async fn latest_active_platform_trunk(&self) -> Result<Option<PlatformTrunk>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM platform_trunks WHERE is_active = 1 ORDER BY created_at DESC, rowid DESC LIMIT 1",
            PLATFORM_TRUNK_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(PlatformTrunk::from_row).transpose()
    }

    pub async fn list_platform_trunks(&self) -> Result<Vec<PlatformTrunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM platform_trunks ORDER BY created_at DESC, rowid DESC",
            PLATFORM_TRUNK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(PlatformTrunk::from_row).collect()
    }
}
