//! Phone number inventory and campaign ownership
//!
//! Ownership is a nullable pointer on the number row, so a number belongs to
//! at most one campaign and a reassignment is a single pointer move.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{debug, info};

use super::DatabaseManager;
use crate::types::{new_id, PhoneNumber};

const PHONE_NUMBER_COLUMNS: &str = "id, tenant_id, number, campaign_id, created_at";

/// A number taken over from another campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberMove {
    pub phone_number_id: String,
    pub previous_campaign_id: String,
}

/// What an assignment change did to the number pointers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDelta {
    /// Numbers that now point at the campaign and did not before
    pub assigned: Vec<String>,
    /// Numbers that pointed at the campaign and were released
    pub unassigned: Vec<String>,
    /// Subset of `assigned` that was owned by another campaign
    pub reassigned_from: Vec<NumberMove>,
}

impl AssignmentDelta {
    /// Campaigns that lost at least one number, deduplicated
    pub fn displaced_campaigns(&self) -> Vec<String> {
        self.reassigned_from
            .iter()
            .map(|m| m.previous_campaign_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl PhoneNumber {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        Ok(PhoneNumber {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            number: row.try_get("number")?,
            campaign_id: row.try_get("campaign_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Point every number in `number_ids` at `campaign_id`
pub(crate) async fn assign_numbers(
    conn: &mut SqliteConnection,
    campaign_id: &str,
    number_ids: &[String],
) -> Result<AssignmentDelta> {
    let mut delta = AssignmentDelta::default();

    for number_id in number_ids {
        let current: Option<Option<String>> =
            sqlx::query_scalar("SELECT campaign_id FROM phone_numbers WHERE id = ?")
                .bind(number_id)
                .fetch_optional(&mut *conn)
                .await?;

        let Some(current) = current else {
            anyhow::bail!("Phone number {} does not exist", number_id);
        };

        if current.as_deref() == Some(campaign_id) {
            continue;
        }

        sqlx::query("UPDATE phone_numbers SET campaign_id = ? WHERE id = ?")
            .bind(campaign_id)
            .bind(number_id)
            .execute(&mut *conn)
            .await?;

        delta.assigned.push(number_id.clone());
        if let Some(previous) = current {
            delta.reassigned_from.push(NumberMove {
                phone_number_id: number_id.clone(),
                previous_campaign_id: previous,
            });
        }
    }

    Ok(delta)
}

impl DatabaseManager {
    /// Add a number to the inventory
    ///
    /// Returns `None` if the number is already registered.
    pub async fn create_phone_number(&self, tenant_id: &str, number: &str) -> Result<Option<PhoneNumber>> {
        let id = new_id();
        let result = sqlx::query(
            "INSERT INTO phone_numbers (id, tenant_id, number, campaign_id, created_at) VALUES (?, ?, ?, NULL, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(number)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!(phone_number_id = %id, number, "Phone number added");
                self.get_phone_number(&id).await
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_phone_number(&self, phone_number_id: &str) -> Result<Option<PhoneNumber>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM phone_numbers WHERE id = ?",
            PHONE_NUMBER_COLUMNS
        ))
        .bind(phone_number_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(PhoneNumber::from_row).transpose()
    }

    /// Fetch the numbers among `ids` that exist
    pub async fn get_phone_numbers_by_ids(&self, ids: &[String]) -> Result<Vec<PhoneNumber>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM phone_numbers WHERE id IN (",
            PHONE_NUMBER_COLUMNS
        ));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(PhoneNumber::from_row).collect()
    }

    /// A tenant's number inventory
    pub async fn list_phone_numbers(&self, tenant_id: &str) -> Result<Vec<PhoneNumber>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM phone_numbers WHERE tenant_id = ? ORDER BY number ASC",
            PHONE_NUMBER_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(PhoneNumber::from_row).collect()
    }

    /// Numbers currently owned by a campaign, sorted by number
    pub async fn list_campaign_phone_numbers(&self, campaign_id: &str) -> Result<Vec<PhoneNumber>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM phone_numbers WHERE campaign_id = ? ORDER BY number ASC",
            PHONE_NUMBER_COLUMNS
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(PhoneNumber::from_row).collect()
    }

    /// Make `number_ids` exactly the set of numbers owned by `campaign_id`
    ///
    /// Releases and assignments commit together; a missing id rolls the
    /// whole change back.
    pub async fn reassign_campaign_numbers(&self, campaign_id: &str, number_ids: &[String]) -> Result<AssignmentDelta> {
        let mut tx = self.begin_transaction().await?;

        let owned: Vec<String> = sqlx::query_scalar("SELECT id FROM phone_numbers WHERE campaign_id = ?")
            .bind(campaign_id)
            .fetch_all(&mut *tx)
            .await?;

        let keep: BTreeSet<&str> = number_ids.iter().map(String::as_str).collect();
        let mut unassigned = Vec::new();
        for id in owned.iter().filter(|id| !keep.contains(id.as_str())) {
            sqlx::query("UPDATE phone_numbers SET campaign_id = NULL WHERE id = ? AND campaign_id = ?")
                .bind(id)
                .bind(campaign_id)
                .execute(&mut *tx)
                .await?;
            unassigned.push(id.clone());
        }

        let mut delta = assign_numbers(&mut tx, campaign_id, number_ids).await?;
        delta.unassigned = unassigned;

        tx.commit().await?;

        debug!(
            campaign_id,
            assigned = delta.assigned.len(),
            unassigned = delta.unassigned.len(),
            reassigned = delta.reassigned_from.len(),
            "Campaign numbers reassigned"
        );
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_number_is_rejected() {
        let db = DatabaseManager::new_in_memory().await.unwrap();
        assert!(db.create_phone_number("t-1", "+14155550100").await.unwrap().is_some());
        assert!(db.create_phone_number("t-2", "+14155550100").await.unwrap().is_none());
    }

    #[test]
    fn test_displaced_campaigns_are_deduplicated() {
        let delta = AssignmentDelta {
            assigned: vec!["n-1".into(), "n-2".into(), "n-3".into()],
            unassigned: vec![],
            reassigned_from: vec![
                NumberMove { phone_number_id: "n-1".into(), previous_campaign_id: "c-b".into() },
                NumberMove { phone_number_id: "n-2".into(), previous_campaign_id: "c-a".into() },
                NumberMove { phone_number_id: "n-3".into(), previous_campaign_id: "c-b".into() },
            ],
        };
        assert_eq!(delta.displaced_campaigns(), vec!["c-a".to_string(), "c-b".to_string()]);
    }
}
