//! Lifecycle coordinator.
//!
//! [`FttbPipeline`] sequences one activation cycle:
//!
//! ```text
//! Idle ──begin_activation──> MeterPending ──complete_activation──> Active
//!  ^                              │                                  │
//!  └──────────deactivate──────────┴────────────deactivate────────────┘
//! ```
//!
//! The meter completion stays inside the pending state. Rules are only
//! built once the coordinator has read the outcome from it, so nothing is
//! built or installed before the meter service has answered.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::config::{MeterFailurePolicy, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::FlowRule;
use crate::meter::{
    await_completion, try_take_completion, Meter, MeterCompletion, MeterOutcome, MeterRequest,
    MeterState,
};
use crate::pipeline::{unpaired_classifiers, PipelineRules, RuleSetBuilder};
use crate::services::{ApplicationId, ApplicationService, FlowRuleService, MeterService};

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Idle,
    MeterPending,
    Active,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::MeterPending => "meter pending",
            LifecycleState::Active => "active",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinator statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Number of completed activations.
    pub activations: u64,
    /// Number of meter submissions that failed.
    pub meter_failures: u64,
    /// Number of rules handed to the flow-rule service for installation.
    pub rules_applied: u64,
    /// Number of rules handed to the flow-rule service for removal.
    pub rules_removed: u64,
    /// Number of reconfigurations received.
    pub reconfigurations: u64,
}

/// Everything an active pipeline owns.
#[derive(Debug)]
struct ActivePipeline {
    meter: Meter,
    rules: PipelineRules,
    installed: Vec<FlowRule>,
}

#[derive(Debug)]
enum Phase {
    Idle,
    MeterPending {
        meter: Meter,
        app_id: ApplicationId,
        completion: MeterCompletion,
    },
    Active(ActivePipeline),
}

impl Phase {
    fn state(&self) -> LifecycleState {
        match self {
            Phase::Idle => LifecycleState::Idle,
            Phase::MeterPending { .. } => LifecycleState::MeterPending,
            Phase::Active(_) => LifecycleState::Active,
        }
    }
}

/// Programs the FTTB pipeline on one device.
pub struct FttbPipeline {
    config: PipelineConfig,
    /// Configuration received while running, applied on the next activation.
    pending_config: Option<PipelineConfig>,
    apps: Arc<dyn ApplicationService>,
    flows: Arc<dyn FlowRuleService>,
    meters: Arc<dyn MeterService>,
    phase: Phase,
    stats: PipelineStats,
}

impl fmt::Debug for FttbPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FttbPipeline")
            .field("device_id", &self.config.device_id)
            .field("state", &self.state())
            .field("reconfiguration_pending", &self.pending_config.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl FttbPipeline {
    /// Creates an idle pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if `config` does not validate.
    pub fn new(
        config: PipelineConfig,
        apps: Arc<dyn ApplicationService>,
        flows: Arc<dyn FlowRuleService>,
        meters: Arc<dyn MeterService>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pending_config: None,
            apps,
            flows,
            meters,
            phase: Phase::Idle,
            stats: PipelineStats::default(),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.phase.state()
    }

    /// Configuration of the current (or next) activation cycle.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// True when a reconfiguration is waiting for the next activation.
    pub fn has_pending_config(&self) -> bool {
        self.pending_config.is_some()
    }

    /// Meter of the current cycle, pending or active.
    pub fn meter(&self) -> Option<&Meter> {
        match &self.phase {
            Phase::Idle => None,
            Phase::MeterPending { meter, .. } => Some(meter),
            Phase::Active(active) => Some(&active.meter),
        }
    }

    /// Full rule set, once active.
    pub fn rules(&self) -> Option<&PipelineRules> {
        match &self.phase {
            Phase::Active(active) => Some(&active.rules),
            _ => None,
        }
    }

    /// Rules installed by the current activation.
    pub fn installed_rules(&self) -> &[FlowRule] {
        match &self.phase {
            Phase::Active(active) => &active.installed,
            _ => &[],
        }
    }

    /// Submits the meter and moves to `MeterPending`.
    ///
    /// The pipeline keeps the meter's completion; drive it with
    /// [`complete_activation`](Self::complete_activation) or
    /// [`try_complete_activation`](Self::try_complete_activation).
    #[instrument(skip(self), fields(device = %self.config.device_id))]
    pub fn begin_activation(&mut self) -> PipelineResult<()> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(PipelineError::invalid_transition("activate", self.state().as_str()));
        }

        if let Some(config) = self.pending_config.take() {
            debug!("Applying pending configuration");
            self.config = config;
        }

        let app_id = self.apps.get_id(&self.config.app_name);
        let request =
            MeterRequest::from_profile(&self.config.meter, self.config.device_id, app_id.clone());
        let submission = self.meters.submit(request);
        debug!(
            "Submitted meter {} with {} bands for {}",
            submission.meter.id,
            submission.meter.bands.len(),
            app_id
        );

        self.phase = Phase::MeterPending {
            meter: submission.meter,
            app_id,
            completion: submission.completion,
        };
        Ok(())
    }

    /// Waits for the pending meter to complete, then builds the rule set and
    /// installs the configured subset.
    ///
    /// A failed meter is logged and activation proceeds with the assigned
    /// meter id, unless the abort policy is configured.
    pub async fn complete_activation(&mut self) -> PipelineResult<()> {
        let outcome = match &mut self.phase {
            Phase::MeterPending { completion, .. } => await_completion(completion).await,
            other => {
                return Err(PipelineError::invalid_transition(
                    "complete activation",
                    other.state().as_str(),
                ))
            }
        };
        self.finish_activation(outcome)
    }

    /// Completes the activation if the meter service has already answered.
    ///
    /// Returns `Ok(false)` and stays in `MeterPending` while the completion
    /// is outstanding.
    pub fn try_complete_activation(&mut self) -> PipelineResult<bool> {
        let outcome = match &mut self.phase {
            Phase::MeterPending { completion, .. } => try_take_completion(completion),
            other => {
                return Err(PipelineError::invalid_transition(
                    "complete activation",
                    other.state().as_str(),
                ))
            }
        };
        match outcome {
            Some(outcome) => self.finish_activation(outcome).map(|()| true),
            None => Ok(false),
        }
    }

    #[instrument(skip(self), fields(device = %self.config.device_id))]
    fn finish_activation(&mut self, outcome: MeterOutcome) -> PipelineResult<()> {
        let (mut meter, app_id) = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::MeterPending { meter, app_id, .. } => (meter, app_id),
            other => {
                let state = other.state();
                self.phase = other;
                return Err(PipelineError::invalid_transition(
                    "complete activation",
                    state.as_str(),
                ));
            }
        };

        match outcome {
            Ok(()) => meter.state = MeterState::Added,
            Err(reason) => {
                meter.state = MeterState::Failed;
                self.stats.meter_failures += 1;
                error!("Cannot create meter {}: {}", meter.id, reason);
                if self.config.meter_failure_policy == MeterFailurePolicy::Abort {
                    self.meters.withdraw(&meter);
                    return Err(PipelineError::MeterFailed {
                        meter_id: meter.id,
                        reason,
                    });
                }
            }
        }

        let rules = RuleSetBuilder::new(&self.config, app_id).build(meter.id);
        let slots = &self.config.installed_rules;
        for slot in slots {
            debug!(
                "Installing {} ({} {})",
                slot,
                slot.traffic_class(),
                slot.direction()
            );
        }
        for slot in unpaired_classifiers(slots) {
            if let Some(partner) = slot.forward_partner() {
                debug!("{} installed without {}; table 1 has no rule for it", slot, partner);
            }
        }

        let installed = rules.select(slots);
        self.flows.apply_flow_rules(&installed);
        self.stats.rules_applied += installed.len() as u64;
        self.stats.activations += 1;

        info!(
            "FTTB test started: meter {} ({} of {} rules installed)",
            meter.id,
            installed.len(),
            rules.len()
        );

        self.phase = Phase::Active(ActivePipeline {
            meter,
            rules,
            installed,
        });
        Ok(())
    }

    /// Runs a full activation: submit, wait for completion, install.
    pub async fn activate(&mut self) -> PipelineResult<()> {
        self.begin_activation()?;
        self.complete_activation().await
    }

    /// Removes the installed rules, withdraws the meter and returns to `Idle`.
    ///
    /// Deactivating while the meter is pending abandons the cycle: the
    /// completion is dropped and no rule is removed.
    #[instrument(skip(self), fields(device = %self.config.device_id))]
    pub fn deactivate(&mut self) -> PipelineResult<()> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => Err(PipelineError::invalid_transition("deactivate", "idle")),
            Phase::MeterPending { meter, .. } => {
                warn!("Deactivated while meter {} was pending", meter.id);
                self.meters.withdraw(&meter);
                Ok(())
            }
            Phase::Active(active) => {
                self.flows.remove_flow_rules(&active.installed);
                self.stats.rules_removed += active.installed.len() as u64;
                self.meters.withdraw(&active.meter);
                info!("FTTB test stopped");
                Ok(())
            }
        }
    }

    /// Records a configuration change.
    ///
    /// The state does not change. A new configuration is validated now and
    /// takes effect on the next activation.
    #[instrument(skip(self, config), fields(device = %self.config.device_id))]
    pub fn modified(&mut self, config: Option<PipelineConfig>) -> PipelineResult<()> {
        if let Some(config) = config {
            config.validate()?;
            self.pending_config = Some(config);
        }
        self.stats.reconfigurations += 1;
        info!("Reconfigured");
        Ok(())
    }
}
