//! Campaign create, update and teardown against the in-memory gateway

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use common::{test_config, Harness, OTHER_TENANT, TENANT};
use rvoip_campaign_engine::database::DatabaseManager;
use rvoip_campaign_engine::database::DispatchRuleRecord;
use rvoip_campaign_engine::gateway::{DispatchRuleConfig, GatewayOperation, TelephonyGateway};
use rvoip_campaign_engine::provisioning::{
    CampaignRequest, CampaignUpdate, CleanupStatus, Outcome, PlatformTrunkSelector,
};
use rvoip_campaign_engine::types::{CampaignType, PlatformTrunk, TrunkType};
use rvoip_campaign_engine::CampaignError;

fn request(campaign_type: CampaignType, agent_ids: Vec<String>, number_ids: Vec<String>) -> CampaignRequest {
    CampaignRequest {
        tenant_id: TENANT.to_string(),
        name: "Spring renewals".to_string(),
        description: Some("Renewal reminders".to_string()),
        campaign_type,
        agent_ids,
        phone_number_ids: number_ids,
    }
}

/// Selector whose backing store is unavailable
struct UnavailableSelector;

#[async_trait]
impl PlatformTrunkSelector for UnavailableSelector {
    async fn select_platform_trunk(&self) -> rvoip_campaign_engine::Result<Option<PlatformTrunk>> {
        Err(CampaignError::internal("platform trunk table unavailable"))
    }
}

async fn campaign_count(h: &Harness) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM campaigns")
        .fetch_one(h.db.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_inbound_campaign_is_fully_provisioned() {
    let h = Harness::new().await;
    let primary = h.active_agent("Closer").await;
    let backup = h.active_agent("Backup").await;
    let n1 = h.phone_number("+14155550100").await;
    let n2 = h.phone_number("+14155550101").await;

    let result = h
        .orchestrator
        .provision(request(
            CampaignType::Inbound,
            vec![primary.id.clone(), backup.id.clone()],
            vec![n1.id.clone(), n2.id.clone()],
        ))
        .await
        .unwrap();

    assert_eq!(result.agents.len(), 2);
    assert_eq!(result.agents[0].agent_id, primary.id);
    assert_eq!(result.agents[0].priority, 1);
    assert_eq!(result.phone_numbers.len(), 2);

    let trunk = result.trunk.resource().expect("trunk provisioned");
    assert_eq!(trunk.trunk_type, TrunkType::Inbound);
    assert_eq!(trunk.platform_trunk_id, h.platform_trunk().await.id);
    let upstream = h.gateway.trunk(trunk.external_id.as_deref().unwrap()).unwrap();
    assert_eq!(upstream.numbers, vec!["+14155550100".to_string(), "+14155550101".to_string()]);
    assert!(upstream.krisp_enabled);

    let rule = result.dispatch_rule.resource().expect("dispatch rule provisioned");
    assert_eq!(rule.agent_name, "Closer");
    assert_eq!(rule.room_name, format!("room-{}", result.campaign.id));
    let upstream_rule = h.gateway.dispatch_rule(rule.external_id.as_deref().unwrap()).unwrap();
    assert_eq!(upstream_rule.trunk_ids, vec![trunk.external_id.clone().unwrap()]);
    assert_eq!(upstream_rule.metadata["campaignId"], result.campaign.id.as_str());
    assert_eq!(upstream_rule.metadata["agentName"], "Closer");
}

#[tokio::test]
async fn test_inbound_campaign_without_numbers_registers_placeholder() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;

    let result = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();

    let trunk = result.trunk.resource().unwrap();
    let numbers = h.gateway.trunk_numbers(trunk.external_id.as_deref().unwrap()).unwrap();
    assert_eq!(numbers, vec![h.config.provisioning.placeholder_number.clone()]);
}

#[tokio::test]
async fn test_outbound_campaign_uses_platform_host() {
    let h = Harness::new().await;
    let agent = h.active_agent("Dialer").await;
    let number = h.phone_number("+14155550100").await;

    let result = h
        .orchestrator
        .provision(request(CampaignType::Outbound, vec![agent.id.clone()], vec![number.id.clone()]))
        .await
        .unwrap();

    let trunk = result.trunk.resource().unwrap();
    assert_eq!(trunk.trunk_type, TrunkType::Outbound);
    let upstream = h.gateway.trunk(trunk.external_id.as_deref().unwrap()).unwrap();
    assert_eq!(upstream.upstream_host.as_deref(), Some("sip.carrier.example.com"));
    assert_eq!(h.gateway.call_count(GatewayOperation::CreateInboundTrunk), 0);
    assert!(result.dispatch_rule.is_success());
}

#[tokio::test]
async fn test_inactive_agent_rejects_whole_campaign() {
    let h = Harness::new().await;
    let active = h.active_agent("Closer").await;
    let inactive = h.inactive_agent("Sleeper").await;

    let requested = vec![active.id.clone(), inactive.id.clone()];
    let err = h
        .orchestrator
        .provision(request(CampaignType::Inbound, requested.clone(), vec![]))
        .await
        .unwrap_err();

    match err {
        CampaignError::InvalidReferences {
            kind,
            invalid_ids,
            requested_ids,
        } => {
            assert_eq!(kind, "agent");
            assert_eq!(invalid_ids, vec![inactive.id.clone()]);
            assert_eq!(requested_ids, requested);
        }
        other => panic!("expected InvalidReferences, got {:?}", other),
    }

    assert_eq!(campaign_count(&h).await, 0);
    assert_eq!(h.gateway.trunk_count(), 0);
}

#[tokio::test]
async fn test_unknown_and_foreign_numbers_are_rejected() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;
    let foreign = h
        .db
        .create_phone_number(OTHER_TENANT, "+14155550199")
        .await
        .unwrap()
        .unwrap();

    let err = h
        .orchestrator
        .provision(request(
            CampaignType::Inbound,
            vec![agent.id.clone()],
            vec![foreign.id.clone(), "no-such-number".to_string()],
        ))
        .await
        .unwrap_err();

    match err {
        CampaignError::InvalidReferences { kind, invalid_ids, .. } => {
            assert_eq!(kind, "phone number");
            assert_eq!(invalid_ids.len(), 2);
        }
        other => panic!("expected InvalidReferences, got {:?}", other),
    }
    assert_eq!(campaign_count(&h).await, 0);
}

#[tokio::test]
async fn test_blank_name_is_invalid_input() {
    let h = Harness::new().await;
    let mut req = request(CampaignType::Inbound, vec![], vec![]);
    req.name = "   ".to_string();

    let err = h.orchestrator.provision(req).await.unwrap_err();
    assert!(matches!(err, CampaignError::InvalidInput(_)));
}

#[tokio::test]
async fn test_trunk_failure_still_creates_campaign() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;
    h.gateway.fail(GatewayOperation::CreateInboundTrunk);

    let result = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();

    assert!(result.trunk.is_error());
    assert!(matches!(result.dispatch_rule, Outcome::Skipped { .. }));
    assert_eq!(h.gateway.call_count(GatewayOperation::CreateDispatchRule), 0);

    let details = h.orchestrator.describe(TENANT, &result.campaign.id).await.unwrap();
    assert!(details.trunk.is_none());
    assert!(details.dispatch_rules.is_empty());
    assert_eq!(details.agents.len(), 1);
}

#[tokio::test]
async fn test_slow_gateway_times_out_as_step_error() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;
    h.gateway.set_latency(Some(Duration::from_secs(2)));

    let result = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();

    match &result.trunk {
        Outcome::Error { message } => assert!(message.contains("timed out"), "{}", message),
        other => panic!("expected trunk error, got {:?}", other),
    }
    assert_eq!(campaign_count(&h).await, 1);
}

#[tokio::test]
async fn test_dispatch_rule_failure_keeps_trunk() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;
    h.gateway.fail(GatewayOperation::CreateDispatchRule);

    let result = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();

    assert!(result.trunk.is_success());
    assert!(result.dispatch_rule.is_error());
    let details = h.orchestrator.describe(TENANT, &result.campaign.id).await.unwrap();
    assert!(details.trunk.is_some());
    assert!(details.dispatch_rules.is_empty());
}

#[tokio::test]
async fn test_without_platform_trunk_nothing_is_provisioned() {
    let h = Harness::without_platform_trunk().await;
    let agent = h.active_agent("Closer").await;

    let result = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();

    assert!(matches!(result.trunk, Outcome::Skipped { .. }));
    assert!(matches!(result.dispatch_rule, Outcome::Skipped { .. }));
    assert_eq!(h.gateway.trunk_count(), 0);
}

#[tokio::test]
async fn test_campaign_without_agents_skips_dispatch_rule() {
    let h = Harness::new().await;

    let result = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![], vec![]))
        .await
        .unwrap();

    assert!(result.trunk.is_success());
    match result.dispatch_rule {
        Outcome::Skipped { message } => assert!(message.contains("no agents")),
        other => panic!("expected skipped dispatch rule, got {:?}", other),
    }
}

#[tokio::test]
async fn test_agent_name_change_updates_rule_in_place() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;
    let created = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();
    let rule = created.dispatch_rule.resource().unwrap().clone();

    let update = CampaignUpdate {
        agent_name: Some("Retention".to_string()),
        ..Default::default()
    };
    let result = h.orchestrator.update(TENANT, &created.campaign.id, update).await.unwrap();

    let updated = result.dispatch_rule_update.unwrap().resource().cloned().unwrap();
    assert_eq!(updated.id, rule.id);
    assert_eq!(updated.external_id, rule.external_id);
    assert_eq!(updated.agent_name, "Retention");
    assert!(result.trunk_update.is_none());

    assert_eq!(h.gateway.call_count(GatewayOperation::UpdateDispatchRule), 1);
    let upstream = h.gateway.dispatch_rule(rule.external_id.as_deref().unwrap()).unwrap();
    assert_eq!(upstream.agent_name, "Retention");
}

#[tokio::test]
async fn test_same_agent_name_is_a_no_op() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;
    let created = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();

    let update = CampaignUpdate {
        agent_name: Some("Closer".to_string()),
        ..Default::default()
    };
    let result = h.orchestrator.update(TENANT, &created.campaign.id, update).await.unwrap();

    assert!(result.dispatch_rule_update.is_none());
    assert_eq!(h.gateway.call_count(GatewayOperation::UpdateDispatchRule), 0);
}

#[tokio::test]
async fn test_new_primary_agent_rebinds_rule() {
    let h = Harness::new().await;
    let first = h.active_agent("Closer").await;
    let second = h.active_agent("Upsell").await;
    let created = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![first.id.clone()], vec![]))
        .await
        .unwrap();

    let update = CampaignUpdate {
        name: Some("Summer renewals".to_string()),
        agent_ids: Some(vec![second.id.clone(), first.id.clone()]),
        ..Default::default()
    };
    let result = h.orchestrator.update(TENANT, &created.campaign.id, update).await.unwrap();

    assert_eq!(result.campaign.name, "Summer renewals");
    let agents = result.agents.unwrap();
    assert_eq!(agents[0].agent_id, second.id);
    assert_eq!(agents[1].priority, 2);
    let rule = result.dispatch_rule_update.unwrap().resource().cloned().unwrap();
    assert_eq!(rule.agent_name, "Upsell");
}

#[tokio::test]
async fn test_invalid_update_changes_nothing() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;
    let sleeper = h.inactive_agent("Sleeper").await;
    let number = h.phone_number("+14155550100").await;
    let created = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();

    let update = CampaignUpdate {
        name: Some("Renamed".to_string()),
        agent_ids: Some(vec![sleeper.id.clone()]),
        phone_number_ids: Some(vec![number.id.clone()]),
        ..Default::default()
    };
    let err = h
        .orchestrator
        .update(TENANT, &created.campaign.id, update)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let details = h.orchestrator.describe(TENANT, &created.campaign.id).await.unwrap();
    assert_eq!(details.campaign.name, "Spring renewals");
    assert_eq!(details.agents[0].agent_id, agent.id);
    assert!(details.phone_numbers.is_empty());
}

#[tokio::test]
async fn test_update_provisions_missing_trunk() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;
    h.gateway.fail(GatewayOperation::CreateInboundTrunk);
    let created = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();
    assert!(created.trunk.is_error());

    h.gateway.recover(GatewayOperation::CreateInboundTrunk);
    let update = CampaignUpdate {
        agent_name: Some("Closer".to_string()),
        ..Default::default()
    };
    let result = h.orchestrator.update(TENANT, &created.campaign.id, update).await.unwrap();

    assert!(result.trunk_update.unwrap().is_success());
    assert!(result.dispatch_rule_update.unwrap().is_success());
    assert_eq!(h.gateway.trunk_count(), 1);
}

#[tokio::test]
async fn test_teardown_counts_partial_rule_cleanup() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;
    let created = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();
    let trunk = created.trunk.resource().unwrap().clone();

    // A second rule on the same trunk whose upstream delete will fail
    let config = DispatchRuleConfig {
        name: "overflow".to_string(),
        agent_name: "Overflow".to_string(),
        room_name: "room-overflow".to_string(),
        trunk_ids: vec![trunk.external_id.clone().unwrap()],
        metadata: serde_json::json!({}),
    };
    let second_external = h.gateway.create_dispatch_rule(&config).await.unwrap();
    h.db.insert_dispatch_rule(
        &created.campaign.id,
        &trunk.id,
        &DispatchRuleRecord {
            external_id: Some(&second_external),
            name: "overflow",
            agent_name: "Overflow",
            room_name: "room-overflow",
        },
    )
    .await
    .unwrap();
    h.gateway.fail_for(GatewayOperation::DeleteDispatchRule, second_external.clone());

    let report = h.orchestrator.teardown(TENANT, &created.campaign.id).await.unwrap();

    assert_eq!(report.dispatch_rule_cleanup.total_rules, 2);
    assert_eq!(report.dispatch_rule_cleanup.successful_cleanups, 1);
    let failed = report
        .dispatch_rule_cleanup
        .results
        .iter()
        .find(|r| r.external_id.as_deref() == Some(second_external.as_str()))
        .unwrap();
    assert_eq!(failed.gateway_cleanup.status, CleanupStatus::Error);
    assert_eq!(failed.db_cleanup.status, CleanupStatus::Success);

    // Both rows are gone locally, along with the campaign
    assert!(h.db.list_campaign_dispatch_rules(&created.campaign.id).await.unwrap().is_empty());
    assert!(h.db.get_campaign(&created.campaign.id).await.unwrap().is_none());
    assert_eq!(campaign_count(&h).await, 0);
}

#[tokio::test]
async fn test_teardown_releases_numbers_and_deletes_trunk() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;
    let number = h.phone_number("+14155550100").await;
    let created = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![number.id.clone()]))
        .await
        .unwrap();

    let report = h.orchestrator.teardown(TENANT, &created.campaign.id).await.unwrap();

    assert_eq!(report.released_phone_numbers, vec![number.id.clone()]);
    let trunk_cleanup = report.trunk_cleanup.unwrap();
    assert_eq!(trunk_cleanup.gateway_cleanup.status, CleanupStatus::Success);
    assert_eq!(h.gateway.trunk_count(), 0);
    assert_eq!(h.gateway.dispatch_rule_count(), 0);

    let released = h.db.get_phone_number(&number.id).await.unwrap().unwrap();
    assert!(released.campaign_id.is_none());
    assert!(h.orchestrator.locks().is_empty());

    let err = h.orchestrator.teardown(TENANT, &created.campaign.id).await.unwrap_err();
    assert!(matches!(err, CampaignError::NotFound(_)));
}

#[tokio::test]
async fn test_other_tenant_cannot_see_campaign() {
    let h = Harness::new().await;
    let created = h
        .orchestrator
        .provision(request(CampaignType::Outbound, vec![], vec![]))
        .await
        .unwrap();

    let err = h.orchestrator.describe(OTHER_TENANT, &created.campaign.id).await.unwrap_err();
    assert!(matches!(err, CampaignError::NotFound(_)));

    let err = h
        .orchestrator
        .teardown(OTHER_TENANT, &created.campaign.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CampaignError::NotFound(_)));
    assert!(h.db.get_campaign(&created.campaign.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_selector_failure_is_reported_as_trunk_error() {
    let db = DatabaseManager::new_in_memory().await.unwrap();
    let h = Harness::assemble(test_config(), db, Arc::new(UnavailableSelector));
    let agent = h.active_agent("Closer").await;

    let result = h
        .orchestrator
        .provision(request(CampaignType::Inbound, vec![agent.id.clone()], vec![]))
        .await
        .unwrap();

    match &result.trunk {
        Outcome::Error { message } => assert!(message.contains("platform trunk table unavailable")),
        other => panic!("expected trunk error, got {:?}", other),
    }
    assert!(matches!(result.dispatch_rule, Outcome::Skipped { .. }));
    assert_eq!(campaign_count(&h).await, 1);
    assert_eq!(h.gateway.trunk_count(), 0);
}
