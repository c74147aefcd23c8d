//! Phone number reconciliation
//!
//! Keeps the numbers pointing at a campaign and the numbers registered on
//! its INBOUND trunk upstream in step. Local assignment is transactional;
//! the upstream update is attempted once and its outcome is cached on the
//! trunk row (`ACTIVE`, or `FAILED` with `last_error`) so drift is visible.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::locks::CampaignLocks;
use super::types::{Outcome, ReconciliationResult, TrunkSync};
use super::validation::{dedupe, validate_phone_numbers};
use crate::config::ProvisioningConfig;
use crate::database::DatabaseManager;
use crate::error::Result;
use crate::gateway::{bounded, TelephonyGateway};
use crate::types::{PhoneNumber, Trunk, TrunkStatus, TrunkType};

/// Numbers to register on an inbound trunk; the gateway refuses an empty set
pub(crate) fn registered_numbers(numbers: &[PhoneNumber], placeholder: &str) -> Vec<String> {
    if numbers.is_empty() {
        vec![placeholder.to_string()]
    } else {
        numbers.iter().map(|n| n.number.clone()).collect()
    }
}

pub struct PhoneNumberReconciler {
    db: DatabaseManager,
    gateway: Arc<dyn TelephonyGateway>,
    locks: CampaignLocks,
    placeholder_number: String,
    gateway_timeout: Duration,
}

impl PhoneNumberReconciler {
    pub fn new(
        db: DatabaseManager,
        gateway: Arc<dyn TelephonyGateway>,
        locks: CampaignLocks,
        settings: &ProvisioningConfig,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            db,
            gateway,
            locks,
            placeholder_number: settings.placeholder_number.clone(),
            gateway_timeout,
        }
    }

    /// Make `number_ids` exactly the campaign's phone numbers and push the
    /// new set to its INBOUND trunk
    ///
    /// Rejects the whole change, before touching anything, if any id is
    /// unknown or belongs to another tenant.
    pub async fn reconcile_assignment(
        &self,
        tenant_id: &str,
        campaign_id: &str,
        number_ids: &[String],
    ) -> Result<ReconciliationResult> {
        let (guard, _) = self.locks.acquire_existing(&self.db, tenant_id, campaign_id).await?;

        let number_ids = dedupe(number_ids);
        validate_phone_numbers(&self.db, tenant_id, &number_ids).await?;
        let (mut result, displaced) = self.apply_locked(campaign_id, &number_ids).await?;
        drop(guard);

        result.displaced_campaign_syncs = self.sync_displaced(&displaced).await;
        Ok(result)
    }

    /// Apply an already validated assignment; the caller holds the campaign lock
    ///
    /// Also returns the campaigns that lost numbers, for the caller to sync
    /// once it has released the lock.
    pub(crate) async fn apply_locked(
        &self,
        campaign_id: &str,
        number_ids: &[String],
    ) -> Result<(ReconciliationResult, Vec<String>)> {
        let delta = self.db.reassign_campaign_numbers(campaign_id, number_ids).await?;
        let displaced = delta.displaced_campaigns();
        let numbers = self.db.list_campaign_phone_numbers(campaign_id).await?;

        info!(
            campaign_id,
            assigned = delta.assigned.len(),
            unassigned = delta.unassigned.len(),
            "🔄 Reconciled campaign phone numbers"
        );

        let trunk_update = self.refresh_trunk_numbers(campaign_id, &numbers).await;

        let result = ReconciliationResult {
            assigned: delta.assigned,
            unassigned: delta.unassigned,
            reassigned_from: delta.reassigned_from,
            numbers,
            trunk_update,
            displaced_campaign_syncs: Vec::new(),
        };
        Ok((result, displaced))
    }

    /// Replace the number set registered on the campaign's INBOUND trunk with
    /// `numbers`
    ///
    /// Runs after the local assignment is committed, so every failure is
    /// reported in the outcome rather than returned.
    pub async fn refresh_trunk_numbers(&self, campaign_id: &str, numbers: &[PhoneNumber]) -> Outcome<Trunk> {
        let trunk = match self.db.get_campaign_trunk(campaign_id).await {
            Ok(Some(trunk)) => trunk,
            Ok(None) => return Outcome::skipped("campaign has no trunk"),
            Err(e) => {
                warn!(campaign_id, "Could not load campaign trunk for number sync: {}", e);
                return Outcome::error(format!("trunk lookup failed, upstream numbers not updated: {}", e));
            }
        };

        if trunk.trunk_type == TrunkType::Outbound {
            return Outcome::skipped("outbound trunks do not carry numbers");
        }

        let Some(external_id) = trunk.external_id.clone() else {
            return Outcome::skipped("trunk was never provisioned upstream");
        };

        let registered = registered_numbers(numbers, &self.placeholder_number);
        let call = self.gateway.update_inbound_trunk_numbers(&external_id, &registered);

        match bounded(self.gateway_timeout, call).await {
            Ok(_) => match self.db.update_trunk_status(&trunk.id, TrunkStatus::Active, None).await {
                Ok(updated) => Outcome::Success {
                    resource: updated.unwrap_or(trunk),
                },
                Err(e) => {
                    warn!(campaign_id, trunk_id = %trunk.id, "Upstream numbers updated but trunk status not recorded: {}", e);
                    Outcome::error(format!("upstream numbers updated but trunk status not recorded: {}", e))
                }
            },
            Err(e) => {
                let message = e.to_string();
                warn!(
                    campaign_id,
                    trunk_id = %trunk.id,
                    external_id = %external_id,
                    "Upstream trunk number update failed, local and upstream numbers differ: {}",
                    message
                );
                if let Err(db_err) = self
                    .db
                    .update_trunk_status(&trunk.id, TrunkStatus::Failed, Some(&message))
                    .await
                {
                    return Outcome::error(format!("{} (trunk status not recorded: {})", message, db_err));
                }
                Outcome::error(message)
            }
        }
    }

    /// Re-push the number sets of campaigns that lost numbers, each under
    /// its own lock
    pub(crate) async fn sync_displaced(&self, campaign_ids: &[String]) -> Vec<TrunkSync> {
        let mut syncs = Vec::with_capacity(campaign_ids.len());

        for campaign_id in campaign_ids {
            let _guard = self.locks.acquire(campaign_id).await;

            let trunk_update = match self.db.list_campaign_phone_numbers(campaign_id).await {
                Ok(numbers) => self.refresh_trunk_numbers(campaign_id, &numbers).await,
                Err(e) => Outcome::error(e.to_string()),
            };

            syncs.push(TrunkSync {
                campaign_id: campaign_id.clone(),
                trunk_update,
            });
        }

        syncs
    }
}
