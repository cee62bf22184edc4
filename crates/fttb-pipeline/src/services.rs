//! Interfaces of the controller services the pipeline talks to.
//!
//! The pipeline never installs anything itself: it hands rules and meter
//! requests to these collaborators. [`crate::sim`] provides in-memory
//! implementations used by the daemon and the tests.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::flow::FlowRule;
use crate::meter::{Meter, MeterRequest, MeterSubmission};

/// Owning-application identity attached to every rule and meter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId {
    pub id: u16,
    pub name: String,
}

impl ApplicationId {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.name)
    }
}

/// Resolves application names to identifiers.
pub trait ApplicationService: Send + Sync {
    /// Returns the id registered for `name`, registering it if needed.
    fn get_id(&self, name: &str) -> ApplicationId;
}

/// Bulk flow-rule installation.
///
/// Both calls are idempotent and fire-and-forget: installation failures are
/// the service's concern and are not reported back.
pub trait FlowRuleService: Send + Sync {
    fn apply_flow_rules(&self, rules: &[FlowRule]);

    fn remove_flow_rules(&self, rules: &[FlowRule]);
}

/// Meter submission.
pub trait MeterService: Send + Sync {
    /// Submits a meter.
    ///
    /// The returned meter already carries its cell id. The completion fires
    /// exactly once, on an executor owned by the service.
    fn submit(&self, request: MeterRequest) -> MeterSubmission;

    /// Releases a meter returned by [`submit`](Self::submit), whatever its
    /// state. Withdrawing an unknown meter is a no-op.
    fn withdraw(&self, meter: &Meter);
}
