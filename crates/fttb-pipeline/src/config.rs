//! Pipeline configuration.
//!
//! Every constant the rule set depends on (ports, VLANs, priorities, the
//! DPU MAC, the meter bands) lives here and is injected into the pipeline at
//! construction time. Defaults reproduce the fixed FTTB test topology.

use olt_types::{DeviceId, MacAddress, PortNumber, VlanId, VlanPcp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::metadata::{try_encode_forwarding, TechProfileId};
use crate::meter::MeterProfile;
use crate::pipeline::RuleSlot;

/// Default target device.
pub const DEFAULT_DEVICE_ID: DeviceId = DeviceId::from_dpid(0x0000_0a0a_0a0a_0a0a);

/// Default owning application.
pub const DEFAULT_APP_NAME: &str = "org.opencord.olt";

/// Subscriber- and network-facing ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortConfig {
    pub uni: PortNumber,
    pub nni: PortNumber,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            uni: PortNumber::new(256),
            nni: PortNumber::new(16_777_216),
        }
    }
}

/// VLAN plan of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VlanConfig {
    /// VLAN carrying DHCP and DPU management/ANCP traffic to and from the DPU.
    pub access_vlan: VlanId,
    /// Network-side VLAN for DHCP and management traffic.
    pub network_vlan: VlanId,
    /// Priority bits identifying upstream management traffic.
    pub mgmt_upstream_pcp: VlanPcp,
    /// Priority bits set on upstream management traffic.
    pub mgmt_network_pcp: VlanPcp,
    /// VLAN set on downstream management traffic towards the DPU.
    pub mgmt_downstream_vlan: VlanId,
    /// Subscriber C-VLAN on the UNI.
    pub subscriber_c_vlan: VlanId,
    /// Subscriber S-VLAN on the NNI.
    pub subscriber_s_vlan: VlanId,
}

impl Default for VlanConfig {
    fn default() -> Self {
        Self {
            access_vlan: vlan(6),
            network_vlan: vlan(60),
            mgmt_upstream_pcp: pcp(3),
            mgmt_network_pcp: pcp(7),
            mgmt_downstream_vlan: vlan(4),
            subscriber_c_vlan: vlan(101),
            subscriber_s_vlan: vlan(3101),
        }
    }
}

/// Rule priorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PriorityConfig {
    /// Trap-to-controller rules.
    pub trap: u16,
    /// Every forwarding rule. Match specificity, not priority, separates them.
    pub forwarding: u16,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            trap: 40_000,
            forwarding: 1_000,
        }
    }
}

/// What activation does when the meter cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterFailurePolicy {
    /// Log the failure and install rules with the assigned meter id.
    #[default]
    Proceed,
    /// Log the failure and go back to idle without installing anything.
    Abort,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub device_id: DeviceId,
    pub app_name: String,
    pub ports: PortConfig,
    /// MAC address of the DPU.
    pub dpu_mac: MacAddress,
    pub tech_profile_id: TechProfileId,
    pub vlans: VlanConfig,
    pub priorities: PriorityConfig,
    pub meter: MeterProfile,
    /// Rules installed on activation, in installation order.
    pub installed_rules: Vec<RuleSlot>,
    pub meter_failure_policy: MeterFailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID,
            app_name: DEFAULT_APP_NAME.to_string(),
            ports: PortConfig::default(),
            dpu_mac: MacAddress::new([0x2e, 0x0a, 0x00, 0x01, 0x00, 0x00]),
            tech_profile_id: TechProfileId::DEFAULT,
            vlans: VlanConfig::default(),
            priorities: PriorityConfig::default(),
            meter: MeterProfile::default(),
            installed_rules: vec![RuleSlot::DhcpServerTrap, RuleSlot::MgmtUpstreamClassify],
            meter_failure_policy: MeterFailurePolicy::Proceed,
        }
    }
}

impl PipelineConfig {
    /// Loads and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parses and validates a JSON config document. Missing fields take
    /// their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Tech profile written into metadata, with the `NONE` sentinel resolved.
    pub fn tech_profile(&self) -> TechProfileId {
        self.tech_profile_id.normalized()
    }

    /// Checks every value the rule set builder will encode.
    ///
    /// A config that passes cannot make rule construction panic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::invalid("app_name", "must not be empty"));
        }

        try_encode_forwarding(VlanId::PRIORITY_TAGGED, self.tech_profile(), PortNumber::new(0))
            .map_err(|e| ConfigError::invalid("tech_profile_id", e))?;

        if self.ports.uni == self.ports.nni {
            return Err(ConfigError::invalid("ports.nni", "must differ from ports.uni"));
        }
        for (field, port) in [("ports.uni", self.ports.uni), ("ports.nni", self.ports.nni)] {
            if port.is_logical() {
                return Err(ConfigError::invalid(field, format!("{} is a reserved port", port)));
            }
            try_encode_forwarding(VlanId::PRIORITY_TAGGED, self.tech_profile(), port)
                .map_err(|e| ConfigError::invalid(field, e))?;
        }

        if self.dpu_mac.is_zero() || self.dpu_mac.is_multicast() {
            return Err(ConfigError::invalid(
                "dpu_mac",
                format!("{} is not a unicast address", self.dpu_mac),
            ));
        }

        let vlans = [
            ("vlans.access_vlan", self.vlans.access_vlan),
            ("vlans.network_vlan", self.vlans.network_vlan),
            ("vlans.mgmt_downstream_vlan", self.vlans.mgmt_downstream_vlan),
            ("vlans.subscriber_c_vlan", self.vlans.subscriber_c_vlan),
            ("vlans.subscriber_s_vlan", self.vlans.subscriber_s_vlan),
        ];
        for (field, vlan) in vlans {
            try_encode_forwarding(vlan, self.tech_profile(), PortNumber::new(0))
                .map_err(|e| ConfigError::invalid(field, e))?;
        }
        if self.vlans.subscriber_c_vlan == self.vlans.access_vlan {
            return Err(ConfigError::invalid(
                "vlans.subscriber_c_vlan",
                "must differ from vlans.access_vlan",
            ));
        }

        if self.priorities.trap <= self.priorities.forwarding {
            return Err(ConfigError::invalid(
                "priorities.trap",
                "must be higher than priorities.forwarding",
            ));
        }

        if self.meter.bands.is_empty() {
            return Err(ConfigError::invalid("meter.bands", "at least one band is required"));
        }
        if let Some(i) = self.meter.bands.iter().position(|b| b.rate == 0) {
            return Err(ConfigError::invalid(format!("meter.bands[{}].rate", i), "must be non-zero"));
        }

        let mut seen = HashSet::new();
        for slot in &self.installed_rules {
            if !seen.insert(*slot) {
                return Err(ConfigError::invalid(
                    "installed_rules",
                    format!("{} listed more than once", slot),
                ));
            }
        }

        Ok(())
    }
}

fn vlan(id: u16) -> VlanId {
    match VlanId::new(id) {
        Ok(vlan) => vlan,
        Err(_) => panic!("VLAN constant out of range"),
    }
}

fn pcp(value: u8) -> VlanPcp {
    match VlanPcp::new(value) {
        Ok(pcp) => pcp,
        Err(_) => panic!("PCP constant out of range"),
    }
}
