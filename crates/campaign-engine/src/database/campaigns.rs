//! Campaign rows and the campaign/agent priority list

use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use tracing::info;

use super::phone_numbers::{assign_numbers, AssignmentDelta};
use super::DatabaseManager;
use crate::types::{new_id, Campaign, CampaignAgent, CampaignType};

const CAMPAIGN_COLUMNS: &str = "id, tenant_id, name, description, campaign_type, created_at, updated_at";

/// Everything persisted when a campaign is created
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    /// Agents in priority order; the first is the primary agent
    pub agent_ids: Vec<String>,
    pub phone_number_ids: Vec<String>,
}

impl Campaign {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let campaign_type: String = row.try_get("campaign_type")?;
        Ok(Campaign {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            campaign_type: CampaignType::from_str(&campaign_type)
                .ok_or_else(|| anyhow!("Unknown campaign type: {}", campaign_type))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl CampaignAgent {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        Ok(CampaignAgent {
            campaign_id: row.try_get("campaign_id")?,
            agent_id: row.try_get("agent_id")?,
            agent_name: row.try_get("agent_name")?,
            priority: row.try_get("priority")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

/// Replace the priority list; priority is the 1-based position in `agent_ids`
async fn write_campaign_agents(conn: &mut SqliteConnection, campaign_id: &str, agent_ids: &[String]) -> Result<()> {
    sqlx::query("DELETE FROM campaign_agents WHERE campaign_id = ?")
        .bind(campaign_id)
        .execute(&mut *conn)
        .await?;

    for (index, agent_id) in agent_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO campaign_agents (campaign_id, agent_id, priority, is_active) VALUES (?, ?, ?, 1)",
        )
        .bind(campaign_id)
        .bind(agent_id)
        .bind(index as i64 + 1)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

impl DatabaseManager {
    /// Insert the campaign, its agent links and its phone number assignments
    /// in one transaction
    ///
    /// Numbers already owned by another campaign move to the new one; the
    /// returned delta names the campaigns that lost them.
    pub async fn create_campaign(&self, new: &NewCampaign) -> Result<(Campaign, AssignmentDelta)> {
        let now = Utc::now();
        let id = new_id();

        let mut tx = self.begin_transaction().await?;

        sqlx::query(
            "INSERT INTO campaigns (id, tenant_id, name, description, campaign_type, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new.tenant_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.campaign_type.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        write_campaign_agents(&mut tx, &id, &new.agent_ids).await?;
        let delta = assign_numbers(&mut tx, &id, &new.phone_number_ids).await?;

        tx.commit().await?;

        info!(
            campaign_id = %id,
            agents = new.agent_ids.len(),
            numbers = new.phone_number_ids.len(),
            "📋 Campaign persisted"
        );

        let campaign = self
            .get_campaign(&id)
            .await?
            .ok_or_else(|| anyhow!("Campaign {} vanished after insert", id))?;
        Ok((campaign, delta))
    }

    /// Fetch a campaign
    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query(&format!("SELECT {} FROM campaigns WHERE id = ?", CAMPAIGN_COLUMNS))
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Campaign::from_row).transpose()
    }

    /// Update the mutable descriptive fields; `None` leaves a field alone
    pub async fn update_campaign_details(
        &self,
        campaign_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Campaign>> {
        sqlx::query(
            "UPDATE campaigns SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;

        self.get_campaign(campaign_id).await
    }

    /// Replace a campaign's agent priority list
    pub async fn replace_campaign_agents(&self, campaign_id: &str, agent_ids: &[String]) -> Result<()> {
        let mut tx = self.begin_transaction().await?;
        write_campaign_agents(&mut tx, campaign_id, agent_ids).await?;
        sqlx::query("UPDATE campaigns SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(campaign_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// A campaign's agents, highest precedence first
    pub async fn list_campaign_agents(&self, campaign_id: &str) -> Result<Vec<CampaignAgent>> {
        let rows = sqlx::query(
            "SELECT ca.campaign_id, ca.agent_id, a.name AS agent_name, ca.priority, ca.is_active
             FROM campaign_agents ca
             JOIN agents a ON a.id = ca.agent_id
             WHERE ca.campaign_id = ?
             ORDER BY ca.priority ASC",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(CampaignAgent::from_row).collect()
    }

    /// Delete a campaign. Agent links, trunk and dispatch rules cascade;
    /// phone numbers are released.
    pub async fn delete_campaign(&self, campaign_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = ?")
            .bind(campaign_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed() -> (DatabaseManager, Vec<String>) {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        let mut ids = Vec::new();
        for name in ["Primary", "Backup"] {
            ids.push(db.create_agent("t-1", name).await.unwrap().id);
        }
        (db, ids)
    }

    fn new_campaign(agent_ids: Vec<String>, phone_number_ids: Vec<String>) -> NewCampaign {
        NewCampaign {
            tenant_id: "t-1".to_string(),
            name: "Spring Promo".to_string(),
            description: None,
            campaign_type: CampaignType::Inbound,
            agent_ids,
            phone_number_ids,
        }
    }

    #[tokio::test]
    async fn test_agents_are_prioritised_by_position() {
        let (db, agents) = seed().await;
        let (campaign, _) = db.create_campaign(&new_campaign(agents.clone(), vec![])).await.unwrap();

        let links = db.list_campaign_agents(&campaign.id).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].agent_id, agents[0]);
        assert_eq!(links[0].priority, 1);
        assert_eq!(links[0].agent_name, "Primary");
        assert_eq!(links[1].priority, 2);
    }

    #[tokio::test]
    async fn test_delete_releases_numbers_and_keeps_agents() {
        let (db, agents) = seed().await;
        let number = db.create_phone_number("t-1", "+14155550100").await.unwrap().unwrap();
        let (campaign, _) = db
            .create_campaign(&new_campaign(agents.clone(), vec![number.id.clone()]))
            .await
            .unwrap();

        assert!(db.delete_campaign(&campaign.id).await.unwrap());

        let number = db.get_phone_number(&number.id).await.unwrap().unwrap();
        assert_eq!(number.campaign_id, None);
        assert!(db.get_agent(&agents[0]).await.unwrap().is_some());
        assert!(db.list_campaign_agents(&campaign.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_leaves_nothing_behind() {
        let (db, _) = seed().await;
        let result = db
            .create_campaign(&new_campaign(vec!["no-such-agent".to_string()], vec![]))
            .await;
        assert!(result.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM campaigns")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_update_details_keeps_unset_fields() {
        let (db, agents) = seed().await;
        let mut new = new_campaign(agents, vec![]);
        new.description = Some("Q2 outreach".to_string());
        let (campaign, _) = db.create_campaign(&new).await.unwrap();

        let updated = db
            .update_campaign_details(&campaign.id, Some("Renamed"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.description.as_deref(), Some("Q2 outreach"));
    }
}
