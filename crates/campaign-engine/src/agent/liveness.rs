use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::database::DatabaseManager;
use crate::error::{CampaignError, Result};
use crate::types::{Agent, AgentStatus, DeploymentOptions, RUNTIME_STATUS_DEPLOYED, RUNTIME_STATUS_STOPPED};

/// Result of evaluating one agent against the staleness threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessEvaluation {
    pub effective_status: AgentStatus,
    /// The persisted status was ACTIVE and must be written as INACTIVE
    pub demoted: bool,
}

/// Evaluate an agent's effective status at `now`
///
/// An ACTIVE agent whose last heartbeat is older than `stale_threshold`, or
/// that has never sent one, is demoted. INACTIVE agents are never promoted
/// here; only a heartbeat or a deploy does that.
pub fn evaluate(agent: &Agent, now: DateTime<Utc>, stale_threshold: Duration) -> LivenessEvaluation {
    if agent.status != AgentStatus::Active {
        return LivenessEvaluation {
            effective_status: agent.status,
            demoted: false,
        };
    }

    let stale = match agent.health.last_heartbeat {
        None => true,
        // A heartbeat stamped in the future is not stale
        Some(at) => (now - at).to_std().map(|age| age > stale_threshold).unwrap_or(false),
    };

    if stale {
        LivenessEvaluation {
            effective_status: AgentStatus::Inactive,
            demoted: true,
        }
    } else {
        LivenessEvaluation {
            effective_status: AgentStatus::Active,
            demoted: false,
        }
    }
}

/// Acknowledgement returned to a heartbeating agent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub agent_status: AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
}

/// Outcome of one sweep over all ACTIVE agents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub evaluated: usize,
    pub demoted: usize,
}

/// Reads agents through the staleness check and ingests heartbeats
#[derive(Clone)]
pub struct LivenessTracker {
    db: DatabaseManager,
    stale_threshold: Duration,
}

impl LivenessTracker {
    pub fn new(db: DatabaseManager, stale_threshold: Duration) -> Self {
        Self { db, stale_threshold }
    }

    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    /// Apply the staleness check to a freshly read agent, persisting a demotion
    async fn refresh(&self, mut agent: Agent, now: DateTime<Utc>) -> Result<Agent> {
        let evaluation = evaluate(&agent, now, self.stale_threshold);
        if !evaluation.demoted {
            return Ok(agent);
        }

        let written = self
            .db
            .demote_agent_if_unchanged(&agent.id, agent.health.last_heartbeat, now)
            .await?;

        if written {
            info!(
                agent_id = %agent.id,
                last_heartbeat = ?agent.health.last_heartbeat,
                "⏱️ Agent heartbeat is stale, demoted to INACTIVE"
            );
            agent.status = AgentStatus::Inactive;
            agent.updated_at = now;
            return Ok(agent);
        }

        // A heartbeat or deploy landed after our read; report what is stored now
        debug!(agent_id = %agent.id, "Demotion skipped, agent changed since read");
        match self.db.get_agent(&agent.id).await? {
            Some(current) => Ok(current),
            None => {
                agent.status = evaluation.effective_status;
                Ok(agent)
            }
        }
    }

    /// Fetch an agent with its effective status
    pub async fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        let agent = self
            .db
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| CampaignError::not_found(format!("agent {}", agent_id)))?;
        self.refresh(agent, Utc::now()).await
    }

    /// List a tenant's agents with their effective statuses
    pub async fn list_agents(&self, tenant_id: &str) -> Result<Vec<Agent>> {
        let now = Utc::now();
        let mut agents = Vec::new();
        for agent in self.db.list_agents(tenant_id).await? {
            agents.push(self.refresh(agent, now).await?);
        }
        Ok(agents)
    }

    /// Fetch the existing agents among `agent_ids` with their effective statuses
    pub async fn get_agents(&self, agent_ids: &[String]) -> Result<Vec<Agent>> {
        let now = Utc::now();
        let mut agents = Vec::new();
        for agent in self.db.get_agents_by_ids(agent_ids).await? {
            agents.push(self.refresh(agent, now).await?);
        }
        Ok(agents)
    }

    /// Ingest a heartbeat
    ///
    /// Always stamps `lastHeartbeat = now`. A `STOPPED` runtime status makes
    /// the agent INACTIVE, anything else makes it ACTIVE.
    pub async fn record_heartbeat(
        &self,
        agent_id: &str,
        runtime_status: Option<&str>,
        metrics: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<HeartbeatAck> {
        let now = Utc::now();
        let status = match runtime_status {
            Some(s) if s.eq_ignore_ascii_case(RUNTIME_STATUS_STOPPED) => AgentStatus::Inactive,
            _ => AgentStatus::Active,
        };

        let found = self
            .db
            .record_heartbeat(agent_id, now, status, runtime_status, metrics)
            .await?;
        if !found {
            return Err(CampaignError::not_found(format!("agent {}", agent_id)));
        }

        if status == AgentStatus::Inactive {
            info!(agent_id, "Agent reported STOPPED, now INACTIVE");
        }

        Ok(HeartbeatAck {
            agent_status: status,
            last_heartbeat: now,
        })
    }

    /// Force an agent ACTIVE and seed its health record
    pub async fn deploy(&self, agent_id: &str, options: &DeploymentOptions) -> Result<Agent> {
        let now = Utc::now();
        let found = self
            .db
            .deploy_agent(agent_id, now, RUNTIME_STATUS_DEPLOYED, options)
            .await?;
        if !found {
            return Err(CampaignError::not_found(format!("agent {}", agent_id)));
        }

        info!(agent_id, record_calls = options.record_calls, "🚀 Agent deployed");
        self.db
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| CampaignError::not_found(format!("agent {}", agent_id)))
    }

    /// Re-evaluate every ACTIVE agent and write demotions
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let active = self.db.list_agents_by_status(AgentStatus::Active).await?;
        let mut report = SweepReport {
            evaluated: active.len(),
            demoted: 0,
        };

        for agent in active {
            if !evaluate(&agent, now, self.stale_threshold).demoted {
                continue;
            }
            match self
                .db
                .demote_agent_if_unchanged(&agent.id, agent.health.last_heartbeat, now)
                .await
            {
                Ok(true) => {
                    report.demoted += 1;
                    info!(agent_id = %agent.id, "⏱️ Sweep demoted stale agent");
                }
                Ok(false) => {}
                Err(e) => warn!(agent_id = %agent.id, "Failed to demote stale agent: {}", e),
            }
        }

        Ok(report)
    }
}
