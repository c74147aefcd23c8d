//! Agent liveness: heartbeats, staleness demotion and the background sweep

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_test::{assert_err, assert_ok};

use common::{threshold, Harness};
use rvoip_campaign_engine::agent::LivenessSweeper;
use rvoip_campaign_engine::types::AgentStatus;
use rvoip_campaign_engine::CampaignError;

#[tokio::test]
async fn test_repeated_heartbeats_keep_agent_active() {
    let h = Harness::new().await;
    let agent = h.inactive_agent("Closer").await;

    let mut last_ack = None;
    for i in 0..5 {
        let mut metrics = serde_json::Map::new();
        metrics.insert("activeCalls".to_string(), serde_json::json!(i));

        let ack = assert_ok!(h.tracker.record_heartbeat(&agent.id, Some("RUNNING"), Some(&metrics)).await);
        assert_eq!(ack.agent_status, AgentStatus::Active);
        last_ack = Some(ack);
    }

    let last_ack = last_ack.unwrap();
    let stored = h.tracker.get_agent(&agent.id).await.unwrap();
    assert_eq!(stored.status, AgentStatus::Active);
    assert_eq!(stored.health.last_heartbeat, Some(last_ack.last_heartbeat));
    assert_eq!(stored.health.runtime_status.as_deref(), Some("RUNNING"));
    assert_eq!(stored.health.metrics["activeCalls"], serde_json::json!(4));
}

#[tokio::test]
async fn test_concurrent_heartbeats_leave_agent_active() {
    let h = Harness::new().await;
    let agent = h.inactive_agent("Closer").await;

    let beats = (0..8).map(|_| h.tracker.record_heartbeat(&agent.id, Some("RUNNING"), None));
    let acks = futures::future::join_all(beats).await;

    let latest = acks
        .into_iter()
        .map(|ack| ack.unwrap().last_heartbeat)
        .max()
        .unwrap();
    let stored = h.tracker.get_agent(&agent.id).await.unwrap();
    assert_eq!(stored.status, AgentStatus::Active);
    assert!(stored.health.last_heartbeat.unwrap() <= latest);
}

#[tokio::test]
async fn test_heartbeat_without_metrics_keeps_previous_metrics() {
    let h = Harness::new().await;
    let agent = h.inactive_agent("Closer").await;

    let mut metrics = serde_json::Map::new();
    metrics.insert("cpu".to_string(), serde_json::json!(0.4));
    h.tracker
        .record_heartbeat(&agent.id, Some("RUNNING"), Some(&metrics))
        .await
        .unwrap();
    h.tracker.record_heartbeat(&agent.id, None, None).await.unwrap();

    let stored = h.tracker.get_agent(&agent.id).await.unwrap();
    assert_eq!(stored.health.metrics["cpu"], serde_json::json!(0.4));
    assert_eq!(stored.health.runtime_status.as_deref(), Some("RUNNING"));
}

#[tokio::test]
async fn test_stopped_heartbeat_makes_agent_inactive() {
    let h = Harness::new().await;
    let agent = h.active_agent("Closer").await;

    let ack = h.tracker.record_heartbeat(&agent.id, Some("stopped"), None).await.unwrap();
    assert_eq!(ack.agent_status, AgentStatus::Inactive);

    let stored = h.tracker.get_agent(&agent.id).await.unwrap();
    assert_eq!(stored.status, AgentStatus::Inactive);
    assert_eq!(stored.health.last_heartbeat, Some(ack.last_heartbeat));
}

#[tokio::test]
async fn test_stale_agent_is_demoted_on_read_and_persisted() {
    let h = Harness::new().await;
    let agent = h.inactive_agent("Closer").await;

    let stale = Utc::now() - chrono::Duration::seconds(100);
    h.db.record_heartbeat(&agent.id, stale, AgentStatus::Active, Some("RUNNING"), None)
        .await
        .unwrap();
    assert_eq!(threshold(), Duration::from_secs(90));

    let read = h.tracker.get_agent(&agent.id).await.unwrap();
    assert_eq!(read.status, AgentStatus::Inactive);

    // The raw row is demoted too, not just the evaluated view
    let raw = h.db.get_agent(&agent.id).await.unwrap().unwrap();
    assert_eq!(raw.status, AgentStatus::Inactive);
    assert_eq!(raw.health.last_heartbeat, Some(stale));

    let again = h.tracker.get_agent(&agent.id).await.unwrap();
    assert_eq!(again.status, AgentStatus::Inactive);
}

#[tokio::test]
async fn test_listing_demotes_stale_agents() {
    let h = Harness::new().await;
    let fresh = h.active_agent("Fresh").await;
    let stale = h.inactive_agent("Stale").await;
    h.db.record_heartbeat(
        &stale.id,
        Utc::now() - chrono::Duration::seconds(300),
        AgentStatus::Active,
        None,
        None,
    )
    .await
    .unwrap();

    let agents = h.tracker.list_agents(common::TENANT).await.unwrap();
    let status_of = |id: &str| agents.iter().find(|a| a.id == id).unwrap().status;
    assert_eq!(status_of(&fresh.id), AgentStatus::Active);
    assert_eq!(status_of(&stale.id), AgentStatus::Inactive);
}

#[tokio::test]
async fn test_deploy_seeds_health_record() {
    let h = Harness::new().await;
    let agent = h.inactive_agent("Closer").await;

    let options = rvoip_campaign_engine::types::DeploymentOptions {
        record_calls: true,
        transcribe_realtime: false,
    };
    let deployed = h.tracker.deploy(&agent.id, &options).await.unwrap();

    assert_eq!(deployed.status, AgentStatus::Active);
    assert_eq!(deployed.health.runtime_status.as_deref(), Some("DEPLOYED"));
    assert!(deployed.health.last_heartbeat.is_some());
    assert_eq!(deployed.deployment, Some(options));

    let err = assert_err!(h.tracker.deploy("ghost", &Default::default()).await);
    assert!(matches!(err, CampaignError::NotFound(_)));
}

#[tokio::test]
async fn test_sweep_demotes_without_reads() {
    let h = Harness::new().await;
    let fresh = h.active_agent("Fresh").await;
    let stale = h.inactive_agent("Stale").await;
    h.db.record_heartbeat(
        &stale.id,
        Utc::now() - chrono::Duration::seconds(100),
        AgentStatus::Active,
        None,
        None,
    )
    .await
    .unwrap();

    let report = h.tracker.sweep().await.unwrap();
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.demoted, 1);

    let raw = h.db.get_agent(&stale.id).await.unwrap().unwrap();
    assert_eq!(raw.status, AgentStatus::Inactive);
    let raw = h.db.get_agent(&fresh.id).await.unwrap().unwrap();
    assert_eq!(raw.status, AgentStatus::Active);

    // Nothing left to demote
    assert_eq!(h.tracker.sweep().await.unwrap().demoted, 0);
}

#[tokio::test]
async fn test_background_sweeper_demotes_stale_agent() {
    let h = Harness::new().await;
    let agent = h.inactive_agent("Crashed").await;
    h.db.record_heartbeat(
        &agent.id,
        Utc::now() - chrono::Duration::seconds(120),
        AgentStatus::Active,
        Some("RUNNING"),
        None,
    )
    .await
    .unwrap();

    let mut sweeper = LivenessSweeper::new(Arc::clone(&h.tracker), Duration::from_millis(20));
    sweeper.start();
    assert!(sweeper.is_running());

    let mut demoted = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let raw = h.db.get_agent(&agent.id).await.unwrap().unwrap();
        if raw.status == AgentStatus::Inactive {
            demoted = true;
            break;
        }
    }

    sweeper.stop().await;
    assert!(demoted, "sweeper never demoted the stale agent");
    assert!(!sweeper.is_running());
}
