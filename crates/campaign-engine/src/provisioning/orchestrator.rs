//! Campaign provisioning orchestrator
//!
//! Drives create, update and teardown of a campaign's trunk, dispatch rule
//! and phone numbers. Validation runs first and fails fast; after that every
//! gateway step is best-effort: a failure is logged, reported as an
//! [`Outcome::Error`] and never rolls back what already succeeded.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use super::locks::CampaignLocks;
use super::platform::PlatformTrunkSelector;
use super::reconciler::{registered_numbers, PhoneNumberReconciler};
use super::types::{
    CampaignDetails, CleanupStep, DispatchRuleCleanup, DispatchRuleCleanupReport, Outcome, ProvisioningResult,
    TeardownReport, TrunkCleanup, UpdateResult,
};
use super::validation::{dedupe, validate_agents, validate_phone_numbers};
use crate::agent::LivenessTracker;
use crate::config::{CampaignEngineConfig, ProvisioningConfig};
use crate::database::{DatabaseManager, DispatchRuleRecord, NewCampaign};
use crate::error::{CampaignError, Result};
use crate::gateway::{
    bounded, DispatchRuleConfig, GatewayError, InboundTrunkOptions, OutboundTrunkOptions, TelephonyGateway,
};
use crate::types::{Campaign, CampaignType, DispatchRule, PhoneNumber, Trunk};

/// Campaign to create
#[derive(Debug, Clone)]
pub struct CampaignRequest {
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    /// Priority order; the first agent is bound to the dispatch rule
    pub agent_ids: Vec<String>,
    pub phone_number_ids: Vec<String>,
}

/// Changes to an existing campaign; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct CampaignUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Agent the dispatch rule routes to
    pub agent_name: Option<String>,
    /// New agent priority list
    pub agent_ids: Option<Vec<String>>,
    /// New complete phone number set
    pub phone_number_ids: Option<Vec<String>>,
}

pub struct ProvisioningOrchestrator {
    db: DatabaseManager,
    gateway: Arc<dyn TelephonyGateway>,
    tracker: Arc<LivenessTracker>,
    selector: Arc<dyn PlatformTrunkSelector>,
    reconciler: Arc<PhoneNumberReconciler>,
    locks: CampaignLocks,
    settings: ProvisioningConfig,
    gateway_timeout: Duration,
}

impl ProvisioningOrchestrator {
    pub fn new(
        db: DatabaseManager,
        gateway: Arc<dyn TelephonyGateway>,
        tracker: Arc<LivenessTracker>,
        selector: Arc<dyn PlatformTrunkSelector>,
        config: &CampaignEngineConfig,
    ) -> Self {
        let locks = CampaignLocks::new();
        let gateway_timeout = config.gateway.request_timeout();
        let reconciler = Arc::new(PhoneNumberReconciler::new(
            db.clone(),
            gateway.clone(),
            locks.clone(),
            &config.provisioning,
            gateway_timeout,
        ));

        Self {
            db,
            gateway,
            tracker,
            selector,
            reconciler,
            locks,
            settings: config.provisioning.clone(),
            gateway_timeout,
        }
    }

    /// The reconciler sharing this orchestrator's campaign locks
    pub fn reconciler(&self) -> &Arc<PhoneNumberReconciler> {
        &self.reconciler
    }

    pub fn locks(&self) -> &CampaignLocks {
        &self.locks
    }

    /// Create a campaign and provision its trunk and dispatch rule
    ///
    /// Only validation and database failures are returned as errors. Gateway
    /// failures leave the campaign in place with the failed step reported.
    pub async fn provision(&self, request: CampaignRequest) -> Result<ProvisioningResult> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(CampaignError::invalid_input("campaign name cannot be empty"));
        }

        let agent_ids = dedupe(&request.agent_ids);
        let number_ids = dedupe(&request.phone_number_ids);
        let agents = validate_agents(&self.tracker, &request.tenant_id, &agent_ids).await?;
        validate_phone_numbers(&self.db, &request.tenant_id, &number_ids).await?;

        let (campaign, delta) = self
            .db
            .create_campaign(&NewCampaign {
                tenant_id: request.tenant_id.clone(),
                name,
                description: request.description.clone(),
                campaign_type: request.campaign_type,
                agent_ids,
                phone_number_ids: number_ids,
            })
            .await?;

        info!(campaign_id = %campaign.id, campaign_type = campaign.campaign_type.as_str(), "📋 Provisioning campaign");

        let phone_numbers = self.db.list_campaign_phone_numbers(&campaign.id).await?;
        let trunk = self.provision_trunk(&campaign, &phone_numbers).await;

        let dispatch_rule = match (trunk.resource(), agents.first()) {
            (Some(trunk), Some(primary)) => self.sync_dispatch_rule(&campaign, trunk, &primary.name, None).await?,
            (None, _) => Outcome::skipped("no trunk to bind a dispatch rule to"),
            (Some(_), None) => Outcome::skipped("campaign has no agents"),
        };

        let displaced_campaign_syncs = self.reconciler.sync_displaced(&delta.displaced_campaigns()).await;

        Ok(ProvisioningResult {
            agents: self.db.list_campaign_agents(&campaign.id).await?,
            campaign,
            phone_numbers,
            trunk,
            dispatch_rule,
            displaced_campaign_syncs,
        })
    }

    /// Apply changes to a campaign
    ///
    /// All references are validated before anything is written. The dispatch
    /// rule is only touched when the bound agent name changes, either given
    /// explicitly or as the name of a new primary agent.
    pub async fn update(&self, tenant_id: &str, campaign_id: &str, update: CampaignUpdate) -> Result<UpdateResult> {
        let (guard, mut campaign) = self.locks.acquire_existing(&self.db, tenant_id, campaign_id).await?;

        let name = update.name.as_deref().map(str::trim);
        if name.is_some_and(str::is_empty) {
            return Err(CampaignError::invalid_input("campaign name cannot be empty"));
        }

        let agents = match &update.agent_ids {
            Some(ids) => {
                let ids = dedupe(ids);
                Some((validate_agents(&self.tracker, tenant_id, &ids).await?, ids))
            }
            None => None,
        };
        let number_ids = match &update.phone_number_ids {
            Some(ids) => {
                let ids = dedupe(ids);
                validate_phone_numbers(&self.db, tenant_id, &ids).await?;
                Some(ids)
            }
            None => None,
        };

        if name.is_some() || update.description.is_some() {
            campaign = self
                .db
                .update_campaign_details(campaign_id, name, update.description.as_deref())
                .await?
                .ok_or_else(|| CampaignError::not_found(format!("campaign {}", campaign_id)))?;
        }

        let mut result = UpdateResult {
            campaign: campaign.clone(),
            agents: None,
            phone_number_updates: None,
            trunk_update: None,
            dispatch_rule_update: None,
        };

        let mut primary_name = None;
        if let Some((agents, ids)) = agents {
            self.db.replace_campaign_agents(campaign_id, &ids).await?;
            primary_name = agents.first().map(|a| a.name.clone());
            result.agents = Some(self.db.list_campaign_agents(campaign_id).await?);
        }

        let mut displaced = Vec::new();
        if let Some(ids) = number_ids {
            let (reconciliation, moved_from) = self.reconciler.apply_locked(campaign_id, &ids).await?;
            displaced = moved_from;
            result.phone_number_updates = Some(reconciliation);
        }

        if let Some(agent_name) = update.agent_name.or(primary_name) {
            let (trunk_update, rule_update) = self.rebind_dispatch_rule(&campaign, &agent_name).await?;
            result.trunk_update = trunk_update;
            result.dispatch_rule_update = rule_update;
        }

        drop(guard);

        if !displaced.is_empty() {
            let syncs = self.reconciler.sync_displaced(&displaced).await;
            if let Some(updates) = result.phone_number_updates.as_mut() {
                updates.displaced_campaign_syncs = syncs;
            }
        }

        Ok(result)
    }

    /// Delete a campaign and clean up what it provisioned upstream
    ///
    /// Each dispatch rule is removed upstream and locally independently, so
    /// a gateway failure never keeps a local row alive. Phone numbers are
    /// released, not deleted.
    pub async fn teardown(&self, tenant_id: &str, campaign_id: &str) -> Result<TeardownReport> {
        let (guard, _) = self.locks.acquire_existing(&self.db, tenant_id, campaign_id).await?;

        let rules = self.db.list_campaign_dispatch_rules(campaign_id).await?;
        let mut results = Vec::with_capacity(rules.len());

        for rule in &rules {
            let gateway_cleanup = match &rule.external_id {
                Some(external_id) => {
                    let call = self.gateway.delete_dispatch_rule(external_id);
                    gateway_cleanup_step(bounded(self.gateway_timeout, call).await)
                }
                None => CleanupStep::skipped("dispatch rule was never provisioned upstream"),
            };

            let db_cleanup = match self.db.delete_dispatch_rule(&rule.id).await {
                Ok(true) => CleanupStep::success(),
                Ok(false) => CleanupStep::skipped("dispatch rule row already removed"),
                Err(e) => CleanupStep::error(e.to_string()),
            };

            let cleanup = DispatchRuleCleanup {
                dispatch_rule_id: rule.id.clone(),
                external_id: rule.external_id.clone(),
                gateway_cleanup,
                db_cleanup,
            };
            if !cleanup.is_clean() {
                warn!(campaign_id, dispatch_rule_id = %rule.id, "Dispatch rule cleanup incomplete: {:?}", cleanup);
            }
            results.push(cleanup);
        }

        let trunk_cleanup = match self.db.get_campaign_trunk(campaign_id).await? {
            Some(trunk) => {
                let gateway_cleanup = match &trunk.external_id {
                    Some(external_id) => {
                        let call = self.gateway.delete_trunk(external_id);
                        gateway_cleanup_step(bounded(self.gateway_timeout, call).await)
                    }
                    None => CleanupStep::skipped("trunk was never provisioned upstream"),
                };
                Some(TrunkCleanup {
                    trunk_id: trunk.id,
                    external_id: trunk.external_id,
                    gateway_cleanup,
                })
            }
            None => None,
        };

        let released_phone_numbers = self
            .db
            .list_campaign_phone_numbers(campaign_id)
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect();

        self.db.delete_campaign(campaign_id).await?;
        drop(guard);
        self.locks.forget(campaign_id);

        let successful_cleanups = results.iter().filter(|r| r.is_clean()).count();
        info!(
            campaign_id,
            total_rules = results.len(),
            successful_cleanups,
            "🗑️ Campaign torn down"
        );

        Ok(TeardownReport {
            campaign_id: campaign_id.to_string(),
            dispatch_rule_cleanup: DispatchRuleCleanupReport {
                total_rules: results.len(),
                successful_cleanups,
                results,
            },
            trunk_cleanup,
            released_phone_numbers,
        })
    }

    /// A campaign with its agents, numbers, trunk and dispatch rules
    pub async fn describe(&self, tenant_id: &str, campaign_id: &str) -> Result<CampaignDetails> {
        let campaign = self.load_campaign(tenant_id, campaign_id).await?;
        Ok(CampaignDetails {
            agents: self.db.list_campaign_agents(campaign_id).await?,
            phone_numbers: self.db.list_campaign_phone_numbers(campaign_id).await?,
            trunk: self.db.get_campaign_trunk(campaign_id).await?,
            dispatch_rules: self.db.list_campaign_dispatch_rules(campaign_id).await?,
            campaign,
        })
    }

    async fn load_campaign(&self, tenant_id: &str, campaign_id: &str) -> Result<Campaign> {
        match self.db.get_campaign(campaign_id).await? {
            Some(campaign) if campaign.tenant_id == tenant_id => Ok(campaign),
            _ => Err(CampaignError::not_found(format!("campaign {}", campaign_id))),
        }
    }

    /// Point the campaign's dispatch rule at `agent_name`
    ///
    /// Reuses the campaign's trunk, provisioning one first if it has none.
    /// Returns the trunk outcome only when a trunk had to be provisioned.
    async fn rebind_dispatch_rule(
        &self,
        campaign: &Campaign,
        agent_name: &str,
    ) -> Result<(Option<Outcome<Trunk>>, Option<Outcome<DispatchRule>>)> {
        let existing = self.db.list_campaign_dispatch_rules(&campaign.id).await?.pop();
        if existing.as_ref().is_some_and(|r| r.agent_name == agent_name) {
            return Ok((None, None));
        }

        let (trunk, trunk_update) = match self.db.get_campaign_trunk(&campaign.id).await? {
            Some(trunk) => (Some(trunk), None),
            None => {
                let numbers = self.db.list_campaign_phone_numbers(&campaign.id).await?;
                let outcome = self.provision_trunk(campaign, &numbers).await;
                (outcome.resource().cloned(), Some(outcome))
            }
        };

        let rule_update = match trunk {
            Some(trunk) => self.sync_dispatch_rule(campaign, &trunk, agent_name, existing).await?,
            None => Outcome::skipped("no trunk to bind a dispatch rule to"),
        };

        Ok((trunk_update, Some(rule_update)))
    }

    /// Create the campaign's trunk upstream and record it
    async fn provision_trunk(&self, campaign: &Campaign, numbers: &[PhoneNumber]) -> Outcome<Trunk> {
        let platform = match self.selector.select_platform_trunk().await {
            Ok(Some(platform)) => platform,
            Ok(None) => {
                info!(campaign_id = %campaign.id, "No active platform trunk, campaign left unprovisioned");
                return Outcome::skipped("no active platform trunk");
            }
            Err(e) => {
                warn!(campaign_id = %campaign.id, "Platform trunk selection failed, continuing without trunk: {}", e);
                return Outcome::error(format!("platform trunk selection failed: {}", e));
            }
        };

        let trunk_type = campaign.campaign_type.trunk_type();
        let trunk_name = format!("campaign-{}-{}", campaign.id, trunk_type.as_str().to_lowercase());

        let created = match campaign.campaign_type {
            CampaignType::Inbound => {
                let numbers = registered_numbers(numbers, &self.settings.placeholder_number);
                let options = InboundTrunkOptions {
                    krisp_enabled: self.settings.krisp_enabled,
                };
                let call = self.gateway.create_inbound_trunk(&trunk_name, &numbers, &options);
                bounded(self.gateway_timeout, call).await
            }
            CampaignType::Outbound => {
                // Outbound trunks are number-agnostic upstream
                let numbers = vec![self.settings.placeholder_number.clone()];
                let options = OutboundTrunkOptions {
                    krisp_enabled: self.settings.krisp_enabled,
                    transport: self.settings.outbound_transport.clone(),
                };
                let call = self
                    .gateway
                    .create_outbound_trunk(&trunk_name, &platform.sip_host, &numbers, &options);
                bounded(self.gateway_timeout, call).await
            }
        };

        let external_id = match created {
            Ok(id) => id,
            Err(e) => {
                warn!(campaign_id = %campaign.id, "Trunk provisioning failed, continuing without trunk: {}", e);
                return Outcome::from(e);
            }
        };

        match self
            .db
            .insert_trunk(&campaign.id, &platform.id, trunk_type, &external_id)
            .await
        {
            Ok(trunk) => Outcome::Success { resource: trunk },
            Err(e) => {
                error!(
                    campaign_id = %campaign.id,
                    external_id = %external_id,
                    "Trunk created upstream but not recorded: {}",
                    e
                );
                Outcome::error(format!(
                    "trunk {} created upstream but not recorded: {}",
                    external_id, e
                ))
            }
        }
    }

    fn dispatch_rule_config(&self, campaign: &Campaign, trunk_external_id: &str, agent_name: &str) -> DispatchRuleConfig {
        DispatchRuleConfig {
            name: format!("campaign-{}-dispatch", campaign.id),
            agent_name: agent_name.to_string(),
            room_name: format!("{}{}", self.settings.room_prefix, campaign.id),
            trunk_ids: vec![trunk_external_id.to_string()],
            metadata: json!({
                "campaignId": campaign.id,
                "campaignName": campaign.name,
                "campaignType": campaign.campaign_type.as_str(),
                "tenantId": campaign.tenant_id,
                "agentName": agent_name,
            }),
        }
    }

    /// Create the dispatch rule, or update `existing` in place, and mirror it
    /// locally
    async fn sync_dispatch_rule(
        &self,
        campaign: &Campaign,
        trunk: &Trunk,
        agent_name: &str,
        existing: Option<DispatchRule>,
    ) -> Result<Outcome<DispatchRule>> {
        let Some(trunk_external_id) = trunk.external_id.as_deref() else {
            return Ok(Outcome::skipped("trunk was never provisioned upstream"));
        };

        let config = self.dispatch_rule_config(campaign, trunk_external_id, agent_name);

        let upstream = match existing.as_ref().and_then(|r| r.external_id.as_deref()) {
            Some(rule_external_id) => {
                let call = self.gateway.update_dispatch_rule(rule_external_id, &config);
                bounded(self.gateway_timeout, call).await
            }
            None => {
                let call = self.gateway.create_dispatch_rule(&config);
                bounded(self.gateway_timeout, call).await
            }
        };

        let rule_external_id = match upstream {
            Ok(id) => id,
            Err(e) => {
                warn!(campaign_id = %campaign.id, agent_name, "Dispatch rule provisioning failed: {}", e);
                return Ok(Outcome::from(e));
            }
        };

        let record = DispatchRuleRecord {
            external_id: Some(&rule_external_id),
            name: &config.name,
            agent_name,
            room_name: &config.room_name,
        };

        let stored = match &existing {
            Some(rule) => self
                .db
                .update_dispatch_rule(&rule.id, &record)
                .await
                .and_then(|r| r.ok_or_else(|| anyhow::anyhow!("dispatch rule {} disappeared during update", rule.id))),
            None => self.db.insert_dispatch_rule(&campaign.id, &trunk.id, &record).await,
        };

        match stored {
            Ok(rule) => {
                info!(campaign_id = %campaign.id, dispatch_rule_id = %rule.id, agent_name, "🔀 Dispatch rule bound");
                Ok(Outcome::Success { resource: rule })
            }
            Err(e) => {
                error!(
                    campaign_id = %campaign.id,
                    external_id = %rule_external_id,
                    "Dispatch rule provisioned upstream but not recorded: {}",
                    e
                );
                Ok(Outcome::error(format!(
                    "dispatch rule {} provisioned upstream but not recorded: {}",
                    rule_external_id, e
                )))
            }
        }
    }
}

/// An upstream delete that finds nothing has nothing left to clean
fn gateway_cleanup_step(result: std::result::Result<(), GatewayError>) -> CleanupStep {
    match result {
        Ok(()) => CleanupStep::success(),
        Err(GatewayError::Rejected { status: 404, .. }) => CleanupStep::skipped("already absent upstream"),
        Err(e) => CleanupStep::error(e.to_string()),
    }
}
