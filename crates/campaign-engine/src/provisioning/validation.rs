//! Reference checks run before any mutation or gateway call

use std::collections::{HashMap, HashSet};

use crate::agent::LivenessTracker;
use crate::database::DatabaseManager;
use crate::error::{CampaignError, Result};
use crate::types::{Agent, AgentStatus, PhoneNumber};

/// Drop repeated ids, keeping first occurrences in order
pub fn dedupe(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}

/// Resolve agents that exist, belong to `tenant_id` and are ACTIVE after the
/// staleness check, in the requested order
pub async fn validate_agents(tracker: &LivenessTracker, tenant_id: &str, agent_ids: &[String]) -> Result<Vec<Agent>> {
    let mut found: HashMap<String, Agent> = tracker
        .get_agents(agent_ids)
        .await?
        .into_iter()
        .map(|a| (a.id.clone(), a))
        .collect();

    let invalid: Vec<String> = agent_ids
        .iter()
        .filter(|id| match found.get(*id) {
            Some(agent) => agent.tenant_id != tenant_id || agent.status != AgentStatus::Active,
            None => true,
        })
        .cloned()
        .collect();

    if !invalid.is_empty() {
        return Err(CampaignError::invalid_references("agent", invalid, agent_ids.to_vec()));
    }

    Ok(agent_ids.iter().filter_map(|id| found.remove(id)).collect())
}

/// Resolve phone numbers that exist and belong to `tenant_id`, in the
/// requested order. Numbers owned by another campaign are reassignable.
pub async fn validate_phone_numbers(
    db: &DatabaseManager,
    tenant_id: &str,
    number_ids: &[String],
) -> Result<Vec<PhoneNumber>> {
    let mut found: HashMap<String, PhoneNumber> = db
        .get_phone_numbers_by_ids(number_ids)
        .await?
        .into_iter()
        .map(|n| (n.id.clone(), n))
        .collect();

    let invalid: Vec<String> = number_ids
        .iter()
        .filter(|id| found.get(*id).map_or(true, |n| n.tenant_id != tenant_id))
        .cloned()
        .collect();

    if !invalid.is_empty() {
        return Err(CampaignError::invalid_references(
            "phone number",
            invalid,
            number_ids.to_vec(),
        ));
    }

    Ok(number_ids.iter().filter_map(|id| found.remove(id)).collect())
}
