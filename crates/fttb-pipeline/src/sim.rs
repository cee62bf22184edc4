//! In-memory controller services.
//!
//! These back the `fttbd` daemon when it runs without a controller and give
//! the integration tests a realistic meter service that completes on its
//! own task.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use olt_types::DeviceId;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::flow::{FlowRule, FlowRuleKey};
use crate::meter::{
    completion_channel, Meter, MeterCompleter, MeterFailReason, MeterId, MeterOutcome,
    MeterRequest, MeterState, MeterSubmission,
};
use crate::services::{ApplicationId, ApplicationService, FlowRuleService, MeterService};

/// Hands out sequential application ids, one per name.
#[derive(Debug, Default)]
pub struct InMemoryApplicationRegistry {
    apps: RwLock<HashMap<String, ApplicationId>>,
}

impl InMemoryApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id registered for `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<ApplicationId> {
        self.apps.read().ok()?.get(name).cloned()
    }
}

/// Id handed to the next application once `registered` names are known.
/// Saturates at `u16::MAX`.
fn next_app_id(registered: usize) -> u16 {
    u16::try_from(registered.saturating_add(1)).unwrap_or(u16::MAX)
}

impl ApplicationService for InMemoryApplicationRegistry {
    fn get_id(&self, name: &str) -> ApplicationId {
        let mut apps = self.apps.write().unwrap_or_else(PoisonError::into_inner);
        let next = next_app_id(apps.len());
        apps.entry(name.to_string())
            .or_insert_with(|| {
                debug!("Registered application {} as {}", name, next);
                ApplicationId::new(next, name)
            })
            .clone()
    }
}

/// Flow table keyed by rule identity.
///
/// Applying a rule that is already present replaces it; removing an absent
/// rule is a no-op.
#[derive(Debug, Default)]
pub struct InMemoryFlowRuleStore {
    rules: RwLock<HashMap<FlowRuleKey, FlowRule>>,
}

impl InMemoryFlowRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, rule: &FlowRule) -> bool {
        self.rules
            .read()
            .map(|rules| rules.contains_key(&rule.key()))
            .unwrap_or(false)
    }

    /// Installed rules, ordered by device, table and descending priority.
    pub fn rules(&self) -> Vec<FlowRule> {
        let mut rules: Vec<FlowRule> = self
            .rules
            .read()
            .map(|rules| rules.values().cloned().collect())
            .unwrap_or_default();
        rules.sort_by(|a, b| {
            (a.device_id, a.table, b.priority).cmp(&(b.device_id, b.table, a.priority))
        });
        rules
    }

    /// Installed rules owned by `app_id`.
    pub fn rules_for_app(&self, app_id: &ApplicationId) -> Vec<FlowRule> {
        self.rules()
            .into_iter()
            .filter(|rule| &rule.app_id == app_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FlowRuleService for InMemoryFlowRuleStore {
    fn apply_flow_rules(&self, rules: &[FlowRule]) {
        let mut table = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        for rule in rules {
            if table.insert(rule.key(), rule.clone()).is_some() {
                debug!("Replaced rule {}", rule);
            } else {
                debug!("Installed rule {}", rule);
            }
        }
    }

    fn remove_flow_rules(&self, rules: &[FlowRule]) {
        let mut table = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        for rule in rules {
            if table.remove(&rule.key()).is_none() {
                debug!("Rule {} was not installed", rule);
            }
        }
    }
}

#[derive(Debug, Default)]
struct MeterTable {
    next_ids: HashMap<DeviceId, u32>,
    meters: HashMap<(DeviceId, MeterId), Meter>,
}

/// Meter table with per-device sequential cell ids.
///
/// Ids are never reused; withdrawn meters leave the table. Completion is delivered from a spawned task after the configured delay
/// when a tokio runtime is available, and inline otherwise.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMeterStore {
    table: Arc<RwLock<MeterTable>>,
    delay: Duration,
    failure: Option<MeterFailReason>,
}

impl InMemoryMeterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every completion by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails every submission with `reason`.
    pub fn fail_with(mut self, reason: MeterFailReason) -> Self {
        self.failure = Some(reason);
        self
    }

    pub fn meter(&self, device_id: DeviceId, id: MeterId) -> Option<Meter> {
        self.table.read().ok()?.meters.get(&(device_id, id)).cloned()
    }

    /// All meters, ordered by device and id.
    pub fn meters(&self) -> Vec<Meter> {
        let mut meters: Vec<Meter> = self
            .table
            .read()
            .map(|t| t.meters.values().cloned().collect())
            .unwrap_or_default();
        meters.sort_by_key(|m| (m.device_id, m.id));
        meters
    }

    fn finish(
        table: &RwLock<MeterTable>,
        key: (DeviceId, MeterId),
        outcome: MeterOutcome,
        completer: MeterCompleter,
    ) {
        if let Some(meter) = table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .meters
            .get_mut(&key)
        {
            meter.state = match outcome {
                Ok(()) => MeterState::Added,
                Err(_) => MeterState::Failed,
            };
        }
        if completer.send(outcome).is_err() {
            debug!("Meter {} completion was not awaited", key.1);
        }
    }
}

impl MeterService for InMemoryMeterStore {
    fn submit(&self, request: MeterRequest) -> MeterSubmission {
        let meter = {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            let next = table.next_ids.entry(request.device_id).or_insert(1);
            let id = MeterId::new(*next);
            *next += 1;
            let meter = Meter::pending(id, &request);
            table.meters.insert((request.device_id, id), meter.clone());
            meter
        };

        let key = (meter.device_id, meter.id);
        let outcome = self.failure.map_or(Ok(()), Err);
        let (completer, completion) = completion_channel();

        match Handle::try_current() {
            Ok(handle) => {
                let table = Arc::clone(&self.table);
                let delay = self.delay;
                handle.spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Self::finish(&table, key, outcome, completer);
                });
            }
            Err(_) => {
                if !self.delay.is_zero() {
                    warn!("No runtime available, completing meter {} immediately", meter.id);
                }
                Self::finish(&self.table, key, outcome, completer);
            }
        }

        MeterSubmission { meter, completion }
    }

    fn withdraw(&self, meter: &Meter) {
        let removed = self
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .meters
            .remove(&(meter.device_id, meter.id));
        match removed {
            Some(_) => debug!("Withdrew meter {}", meter.id),
            None => debug!("Meter {} was not in the table", meter.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::flow::TrafficSelector;
    use crate::meter::{await_completion, MeterProfile};
    use crate::pipeline::{RuleSetBuilder, RuleSlot};
    use pretty_assertions::assert_eq;

    fn app() -> ApplicationId {
        ApplicationId::new(1, "org.opencord.olt")
    }

    fn request(device_id: DeviceId) -> MeterRequest {
        MeterRequest::from_profile(&MeterProfile::default(), device_id, app())
    }

    #[test]
    fn test_registry_is_stable_per_name() {
        let registry = InMemoryApplicationRegistry::new();
        let olt = registry.get_id("org.opencord.olt");
        let other = registry.get_id("org.example.other");

        assert_eq!(olt, ApplicationId::new(1, "org.opencord.olt"));
        assert_eq!(other.id, 2);
        assert_eq!(registry.get_id("org.opencord.olt"), olt);
        assert_eq!(registry.lookup("org.example.other"), Some(other));
        assert_eq!(registry.lookup("missing"), None);
    }

    #[test]
    fn test_registry_ids_saturate() {
        assert_eq!(next_app_id(0), 1);
        assert_eq!(next_app_id(65_533), 65_534);
        assert_eq!(next_app_id(65_534), u16::MAX);
        assert_eq!(next_app_id(65_535), u16::MAX);
        assert_eq!(next_app_id(usize::MAX), u16::MAX);
    }

    #[test]
    fn test_flow_store_treats_reordered_selector_as_same_rule() {
        let config = PipelineConfig::default();
        let rules = RuleSetBuilder::new(&config, app()).build(MeterId::new(1));
        let rule = rules.get(RuleSlot::MgmtUpstreamClassify).clone();

        let mut reversed = rule.selector.criteria().to_vec();
        reversed.reverse();
        let reordered = rule.clone().with_selector(
            reversed
                .into_iter()
                .fold(TrafficSelector::new(), |selector, criterion| selector.with(criterion)),
        );
        assert_ne!(rule.selector, reordered.selector);

        let store = InMemoryFlowRuleStore::new();
        store.apply_flow_rules(&[rule.clone()]);
        store.apply_flow_rules(&[reordered.clone()]);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&rule));

        store.remove_flow_rules(&[reordered]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_withdrawn_meters_leave_the_table() {
        let store = InMemoryMeterStore::new();
        let device = DeviceId::from_dpid(1);
        let first = store.submit(request(device)).meter;
        let second = store.submit(request(device)).meter;

        store.withdraw(&first);
        store.withdraw(&first);
        assert_eq!(store.meters(), vec![store.meter(device, second.id).unwrap()]);
        assert!(store.meter(device, first.id).is_none());

        // Ids keep counting after a withdrawal.
        assert_eq!(store.submit(request(device)).meter.id, MeterId::new(3));
        store.withdraw(&second);
        assert_eq!(store.meters().len(), 1);
    }

    #[test]
    fn test_flow_store_is_idempotent() {
        let config = PipelineConfig::default();
        let rules = RuleSetBuilder::new(&config, app()).build(MeterId::new(1));
        let store = InMemoryFlowRuleStore::new();

        store.apply_flow_rules(rules.as_slice());
        store.apply_flow_rules(rules.as_slice());
        assert_eq!(store.len(), 10);
        assert!(store.contains(rules.get(RuleSlot::DhcpClientTrap)));

        let traps = rules.select(&[RuleSlot::DhcpClientTrap, RuleSlot::DhcpServerTrap]);
        store.remove_flow_rules(&traps);
        store.remove_flow_rules(&traps);
        assert_eq!(store.len(), 8);
        assert!(!store.contains(rules.get(RuleSlot::DhcpServerTrap)));
        assert_eq!(store.rules_for_app(&app()).len(), 8);
        assert!(store.rules_for_app(&ApplicationId::new(2, "other")).is_empty());
    }

    #[test]
    fn test_flow_store_orders_by_table_and_priority() {
        let config = PipelineConfig::default();
        let rules = RuleSetBuilder::new(&config, app()).build(MeterId::new(1));
        let store = InMemoryFlowRuleStore::new();
        store.apply_flow_rules(rules.as_slice());

        let listed = store.rules();
        assert_eq!(listed[0].priority, 40000);
        assert_eq!(listed[1].priority, 40000);
        assert!(listed[..6].iter().all(|r| r.table == 0));
        assert!(listed[6..].iter().all(|r| r.table == 1));
    }

    #[test]
    fn test_meter_ids_are_sequential_per_device() {
        let store = InMemoryMeterStore::new();
        let a = DeviceId::from_dpid(1);
        let b = DeviceId::from_dpid(2);

        assert_eq!(store.submit(request(a)).meter.id, MeterId::new(1));
        assert_eq!(store.submit(request(a)).meter.id, MeterId::new(2));
        assert_eq!(store.submit(request(b)).meter.id, MeterId::new(1));
        assert_eq!(store.meters().len(), 3);
    }

    #[test]
    fn test_meter_completes_inline_without_runtime() {
        let store = InMemoryMeterStore::new();
        let device = DeviceId::from_dpid(1);
        let mut submission = store.submit(request(device));

        assert_eq!(submission.completion.try_recv(), Ok(Ok(())));
        assert_eq!(
            store.meter(device, submission.meter.id).unwrap().state,
            MeterState::Added
        );
    }

    #[tokio::test]
    async fn test_meter_completes_on_spawned_task() {
        let store = InMemoryMeterStore::new().with_delay(Duration::from_millis(5));
        let device = DeviceId::from_dpid(1);
        let mut submission = store.submit(request(device));

        assert_eq!(submission.meter.state, MeterState::Pending);
        assert_eq!(await_completion(&mut submission.completion).await, Ok(()));
        assert_eq!(
            store.meter(device, submission.meter.id).unwrap().state,
            MeterState::Added
        );
    }

    #[tokio::test]
    async fn test_meter_forced_failure() {
        let store = InMemoryMeterStore::new().fail_with(MeterFailReason::OutOfMeters);
        let device = DeviceId::from_dpid(1);
        let mut submission = store.submit(request(device));

        assert_eq!(
            await_completion(&mut submission.completion).await,
            Err(MeterFailReason::OutOfMeters)
        );
        assert_eq!(
            store.meter(device, submission.meter.id).unwrap().state,
            MeterState::Failed
        );
    }
}
