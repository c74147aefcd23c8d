//! In-process gateway
//!
//! Keeps trunks and dispatch rules in memory and hands out `ST_`/`SDR_`
//! ids the way the real service does. Failures and latency can be injected
//! per operation, which is what the provisioning tests drive it with.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{
    DispatchRuleConfig, GatewayError, GatewayOperation, GatewayResult, InboundTrunkOptions, OutboundTrunkOptions,
    TelephonyGateway,
};
use crate::types::TrunkType;

/// A trunk as the in-memory gateway stores it
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTrunk {
    pub name: String,
    pub trunk_type: TrunkType,
    pub numbers: Vec<String>,
    pub upstream_host: Option<String>,
    pub krisp_enabled: bool,
}

#[derive(Debug, Clone)]
enum Failure {
    Always,
    Targets(HashSet<String>),
}

#[derive(Default)]
struct State {
    trunks: HashMap<String, MemoryTrunk>,
    rules: HashMap<String, DispatchRuleConfig>,
    failures: HashMap<GatewayOperation, Failure>,
    calls: HashMap<GatewayOperation, usize>,
    next_id: u64,
}

impl State {
    /// Count the call and decide whether it is failed by injection
    fn enter(&mut self, operation: GatewayOperation, target: Option<&str>) -> GatewayResult<()> {
        *self.calls.entry(operation).or_default() += 1;

        let injected = match self.failures.get(&operation) {
            Some(Failure::Always) => true,
            Some(Failure::Targets(ids)) => target.is_some_and(|t| ids.contains(t)),
            None => false,
        };

        if injected {
            debug!(operation = operation.as_str(), ?target, "Injected gateway failure");
            return Err(GatewayError::Rejected {
                status: 503,
                message: format!("injected failure for {}", operation.as_str()),
            });
        }
        Ok(())
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{:06}", prefix, self.next_id)
    }
}

fn not_found(what: &str, id: &str) -> GatewayError {
    GatewayError::Rejected {
        status: 404,
        message: format!("{} {} not found", what, id),
    }
}

#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call of `operation` until [`recover`](Self::recover)
    pub fn fail(&self, operation: GatewayOperation) {
        self.state.lock().failures.insert(operation, Failure::Always);
    }

    /// Fail calls of `operation` that target `id` (trunk or dispatch rule id)
    pub fn fail_for(&self, operation: GatewayOperation, id: impl Into<String>) {
        let mut state = self.state.lock();
        match state.failures.entry(operation).or_insert_with(|| Failure::Targets(HashSet::new())) {
            Failure::Targets(ids) => {
                ids.insert(id.into());
            }
            Failure::Always => {}
        }
    }

    pub fn recover(&self, operation: GatewayOperation) {
        self.state.lock().failures.remove(&operation);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn trunk(&self, trunk_id: &str) -> Option<MemoryTrunk> {
        self.state.lock().trunks.get(trunk_id).cloned()
    }

    pub fn trunk_numbers(&self, trunk_id: &str) -> Option<Vec<String>> {
        self.trunk(trunk_id).map(|t| t.numbers)
    }

    pub fn dispatch_rule(&self, rule_id: &str) -> Option<DispatchRuleConfig> {
        self.state.lock().rules.get(rule_id).cloned()
    }

    pub fn trunk_count(&self) -> usize {
        self.state.lock().trunks.len()
    }

    pub fn dispatch_rule_count(&self) -> usize {
        self.state.lock().rules.len()
    }

    /// Number of times `operation` was attempted, including failed attempts
    pub fn call_count(&self, operation: GatewayOperation) -> usize {
        self.state.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl TelephonyGateway for InMemoryGateway {
    async fn create_inbound_trunk(
        &self,
        name: &str,
        numbers: &[String],
        options: &InboundTrunkOptions,
    ) -> GatewayResult<String> {
        self.delay().await;
        let mut state = self.state.lock();
        state.enter(GatewayOperation::CreateInboundTrunk, None)?;

        if numbers.is_empty() {
            return Err(GatewayError::Rejected {
                status: 400,
                message: "inbound trunk requires at least one number".to_string(),
            });
        }

        let id = state.next_id("ST");
        state.trunks.insert(
            id.clone(),
            MemoryTrunk {
                name: name.to_string(),
                trunk_type: TrunkType::Inbound,
                numbers: numbers.to_vec(),
                upstream_host: None,
                krisp_enabled: options.krisp_enabled,
            },
        );
        Ok(id)
    }

    async fn create_outbound_trunk(
        &self,
        name: &str,
        upstream_host: &str,
        numbers: &[String],
        options: &OutboundTrunkOptions,
    ) -> GatewayResult<String> {
        self.delay().await;
        let mut state = self.state.lock();
        state.enter(GatewayOperation::CreateOutboundTrunk, None)?;

        let id = state.next_id("ST");
        state.trunks.insert(
            id.clone(),
            MemoryTrunk {
                name: name.to_string(),
                trunk_type: TrunkType::Outbound,
                numbers: numbers.to_vec(),
                upstream_host: Some(upstream_host.to_string()),
                krisp_enabled: options.krisp_enabled,
            },
        );
        Ok(id)
    }

    async fn update_inbound_trunk_numbers(&self, trunk_id: &str, numbers: &[String]) -> GatewayResult<String> {
        self.delay().await;
        let mut state = self.state.lock();
        state.enter(GatewayOperation::UpdateInboundTrunkNumbers, Some(trunk_id))?;

        match state.trunks.get_mut(trunk_id) {
            Some(trunk) if trunk.trunk_type == TrunkType::Inbound => {
                trunk.numbers = numbers.to_vec();
                Ok(trunk_id.to_string())
            }
            Some(_) => Err(GatewayError::Rejected {
                status: 400,
                message: format!("trunk {} is not an inbound trunk", trunk_id),
            }),
            None => Err(not_found("trunk", trunk_id)),
        }
    }

    async fn delete_trunk(&self, trunk_id: &str) -> GatewayResult<()> {
        self.delay().await;
        let mut state = self.state.lock();
        state.enter(GatewayOperation::DeleteTrunk, Some(trunk_id))?;

        state
            .trunks
            .remove(trunk_id)
            .map(|_| ())
            .ok_or_else(|| not_found("trunk", trunk_id))
    }

    async fn create_dispatch_rule(&self, config: &DispatchRuleConfig) -> GatewayResult<String> {
        self.delay().await;
        let mut state = self.state.lock();
        state.enter(GatewayOperation::CreateDispatchRule, None)?;

        if let Some(missing) = config.trunk_ids.iter().find(|id| !state.trunks.contains_key(*id)) {
            return Err(not_found("trunk", missing));
        }

        let id = state.next_id("SDR");
        state.rules.insert(id.clone(), config.clone());
        Ok(id)
    }

    async fn update_dispatch_rule(&self, rule_id: &str, config: &DispatchRuleConfig) -> GatewayResult<String> {
        self.delay().await;
        let mut state = self.state.lock();
        state.enter(GatewayOperation::UpdateDispatchRule, Some(rule_id))?;

        match state.rules.get_mut(rule_id) {
            Some(rule) => {
                *rule = config.clone();
                Ok(rule_id.to_string())
            }
            None => Err(not_found("dispatch rule", rule_id)),
        }
    }

    async fn delete_dispatch_rule(&self, rule_id: &str) -> GatewayResult<()> {
        self.delay().await;
        let mut state = self.state.lock();
        state.enter(GatewayOperation::DeleteDispatchRule, Some(rule_id))?;

        state
            .rules
            .remove(rule_id)
            .map(|_| ())
            .ok_or_else(|| not_found("dispatch rule", rule_id))
    }
}
