use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::database::DatabaseManager;
use crate::error::{CampaignError, Result};
use crate::types::Campaign;

/// In-process keyed mutex serializing work on one campaign
///
/// Held around whole update, reconcile and teardown sequences, including
/// their gateway calls. Different campaigns never contend.
#[derive(Clone, Default)]
pub struct CampaignLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl CampaignLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `campaign_id`
    pub async fn acquire(&self, campaign_id: &str) -> OwnedMutexGuard<()> {
        // Clone the mutex out so the map shard is not locked while waiting
        let lock = self
            .locks
            .entry(campaign_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Lock a campaign that exists and belongs to `tenant_id`
    ///
    /// The campaign is read after the lock is taken, so it is current for as
    /// long as the guard is held.
    pub async fn acquire_existing(
        &self,
        db: &DatabaseManager,
        tenant_id: &str,
        campaign_id: &str,
    ) -> Result<(OwnedMutexGuard<()>, Campaign)> {
        let guard = self.acquire(campaign_id).await;
        match db.get_campaign(campaign_id).await? {
            Some(campaign) if campaign.tenant_id == tenant_id => Ok((guard, campaign)),
            _ => {
                drop(guard);
                self.forget(campaign_id);
                Err(CampaignError::not_found(format!("campaign {}", campaign_id)))
            }
        }
    }

    /// Drop the entry for a deleted campaign if nobody else holds or awaits it
    pub fn forget(&self, campaign_id: &str) {
        // Guards and waiters each hold a clone; an idle lock is referenced by the map alone
        self.locks.remove_if(campaign_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
