//! Campaign telephony provisioning
//!
//! [`ProvisioningOrchestrator`] creates, updates and tears down a campaign's
//! trunk and dispatch rule. [`PhoneNumberReconciler`] keeps the campaign's
//! phone numbers and its inbound trunk's registered numbers in sync. Both
//! serialize work per campaign through a shared [`CampaignLocks`].

pub mod locks;
pub mod orchestrator;
pub mod platform;
pub mod reconciler;
pub mod types;
pub mod validation;

pub use locks::CampaignLocks;
pub use orchestrator::{CampaignRequest, CampaignUpdate, ProvisioningOrchestrator};
pub use platform::{LatestActivePlatformTrunk, PlatformTrunkSelector, StaticPlatformTrunk};
pub use reconciler::PhoneNumberReconciler;
pub use types::{
    CampaignDetails, CleanupStatus, CleanupStep, DispatchRuleCleanup, DispatchRuleCleanupReport, Outcome,
    ProvisioningResult, ReconciliationResult, TeardownReport, TrunkCleanup, TrunkSync, UpdateResult,
};
