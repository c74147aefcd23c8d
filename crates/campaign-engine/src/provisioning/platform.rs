//! Platform trunk selection
//!
//! Campaign trunks hang off a shared carrier-level platform trunk. Which one
//! is used is a policy injected into the orchestrator.

use async_trait::async_trait;

use crate::database::DatabaseManager;
use crate::error::Result;
use crate::types::PlatformTrunk;

#[async_trait]
pub trait PlatformTrunkSelector: Send + Sync {
    /// The platform trunk new campaign trunks should use, if any
    async fn select_platform_trunk(&self) -> Result<Option<PlatformTrunk>>;
}

/// Picks the most recently created active platform trunk
pub struct LatestActivePlatformTrunk {
    db: DatabaseManager,
}

impl LatestActivePlatformTrunk {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PlatformTrunkSelector for LatestActivePlatformTrunk {
    async fn select_platform_trunk(&self) -> Result<Option<PlatformTrunk>> {
        Ok(self.db.latest_active_platform_trunk().await?)
    }
}

/// Always returns the same platform trunk (or none)
pub struct StaticPlatformTrunk(Option<PlatformTrunk>);

impl StaticPlatformTrunk {
    pub fn new(trunk: PlatformTrunk) -> Self {
        Self(Some(trunk))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl PlatformTrunkSelector for StaticPlatformTrunk {
    async fn select_platform_trunk(&self) -> Result<Option<PlatformTrunk>> {
        Ok(self.0.clone())
    }
}
