//! Flow rule model: selectors, treatments and rules.
//!
//! A [`FlowRule`] pairs a [`TrafficSelector`] (what to match) with a
//! [`TrafficTreatment`] (what to do) in one table of the device pipeline.
//! Rules are built once and never mutated afterwards.

use olt_types::{DeviceId, MacAddress, PortNumber, VlanId, VlanPcp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem;

use crate::metadata::Metadata;
use crate::meter::MeterId;
use crate::services::ApplicationId;

/// A single match condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Criterion {
    InPort(PortNumber),
    VlanVid(VlanId),
    VlanPcp(VlanPcp),
    EthType(u16),
    IpProto(u8),
    UdpSrc(u16),
    EthSrc(MacAddress),
    EthDst(MacAddress),
    Metadata(Metadata),
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InPort(port) => write!(f, "IN_PORT:{}", port),
            Self::VlanVid(vlan) => write!(f, "VLAN_VID:{}", vlan),
            Self::VlanPcp(pcp) => write!(f, "VLAN_PCP:{}", pcp),
            Self::EthType(etype) => write!(f, "ETH_TYPE:0x{:04x}", etype),
            Self::IpProto(proto) => write!(f, "IP_PROTO:{}", proto),
            Self::UdpSrc(port) => write!(f, "UDP_SRC:{}", port),
            Self::EthSrc(mac) => write!(f, "ETH_SRC:{}", mac),
            Self::EthDst(mac) => write!(f, "ETH_DST:{}", mac),
            Self::Metadata(meta) => write!(f, "METADATA:{}", meta),
        }
    }
}

/// Ordered set of match conditions, at most one per criterion kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficSelector {
    criteria: Vec<Criterion>,
}

impl TrafficSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a criterion, replacing any earlier one of the same kind.
    pub fn with(mut self, criterion: Criterion) -> Self {
        let kind = mem::discriminant(&criterion);
        match self.criteria.iter_mut().find(|c| mem::discriminant(&**c) == kind) {
            Some(existing) => *existing = criterion,
            None => self.criteria.push(criterion),
        }
        self
    }

    pub fn match_in_port(self, port: PortNumber) -> Self {
        self.with(Criterion::InPort(port))
    }

    pub fn match_vlan_id(self, vlan: VlanId) -> Self {
        self.with(Criterion::VlanVid(vlan))
    }

    pub fn match_vlan_pcp(self, pcp: VlanPcp) -> Self {
        self.with(Criterion::VlanPcp(pcp))
    }

    pub fn match_eth_type(self, etype: u16) -> Self {
        self.with(Criterion::EthType(etype))
    }

    pub fn match_ip_protocol(self, proto: u8) -> Self {
        self.with(Criterion::IpProto(proto))
    }

    pub fn match_udp_src(self, port: u16) -> Self {
        self.with(Criterion::UdpSrc(port))
    }

    pub fn match_eth_src(self, mac: MacAddress) -> Self {
        self.with(Criterion::EthSrc(mac))
    }

    pub fn match_eth_dst(self, mac: MacAddress) -> Self {
        self.with(Criterion::EthDst(mac))
    }

    pub fn match_metadata(self, metadata: Metadata) -> Self {
        self.with(Criterion::Metadata(metadata))
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn in_port(&self) -> Option<PortNumber> {
        self.criteria.iter().find_map(|c| match c {
            Criterion::InPort(port) => Some(*port),
            _ => None,
        })
    }

    pub fn vlan_id(&self) -> Option<VlanId> {
        self.criteria.iter().find_map(|c| match c {
            Criterion::VlanVid(vlan) => Some(*vlan),
            _ => None,
        })
    }

    pub fn metadata(&self) -> Option<Metadata> {
        self.criteria.iter().find_map(|c| match c {
            Criterion::Metadata(meta) => Some(*meta),
            _ => None,
        })
    }
}

impl fmt::Display for TrafficSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.criteria.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// A single treatment instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Instruction {
    SetVlanId { vlan: VlanId },
    SetVlanPcp { pcp: VlanPcp },
    Output { port: PortNumber },
    WriteMetadata { value: Metadata, mask: u64 },
    Meter { meter_id: MeterId },
    Transition { table: u8 },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetVlanId { vlan } => write!(f, "VLAN_ID:{}", vlan),
            Self::SetVlanPcp { pcp } => write!(f, "VLAN_PCP:{}", pcp),
            Self::Output { port } => write!(f, "OUTPUT:{}", port),
            Self::WriteMetadata { value, mask } => {
                write!(f, "WRITE_METADATA:{}/0x{:x}", value, mask)
            }
            Self::Meter { meter_id } => write!(f, "METER:{}", meter_id),
            Self::Transition { table } => write!(f, "TRANSITION:{}", table),
        }
    }
}

/// Ordered instruction list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrafficTreatment {
    /// Apply-actions (true) rather than write-actions.
    pub immediate: bool,
    instructions: Vec<Instruction>,
}

impl TrafficTreatment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the treatment as immediate (apply-actions).
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn with(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn set_vlan_id(self, vlan: VlanId) -> Self {
        self.with(Instruction::SetVlanId { vlan })
    }

    pub fn set_vlan_pcp(self, pcp: VlanPcp) -> Self {
        self.with(Instruction::SetVlanPcp { pcp })
    }

    pub fn set_output(self, port: PortNumber) -> Self {
        self.with(Instruction::Output { port })
    }

    pub fn write_metadata(self, value: Metadata, mask: u64) -> Self {
        self.with(Instruction::WriteMetadata { value, mask })
    }

    pub fn meter(self, meter_id: MeterId) -> Self {
        self.with(Instruction::Meter { meter_id })
    }

    pub fn transition(self, table: u8) -> Self {
        self.with(Instruction::Transition { table })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn meter_id(&self) -> Option<MeterId> {
        self.instructions.iter().find_map(|i| match i {
            Instruction::Meter { meter_id } => Some(*meter_id),
            _ => None,
        })
    }

    pub fn output(&self) -> Option<PortNumber> {
        self.instructions.iter().find_map(|i| match i {
            Instruction::Output { port } => Some(*port),
            _ => None,
        })
    }

    pub fn transition_table(&self) -> Option<u8> {
        self.instructions.iter().find_map(|i| match i {
            Instruction::Transition { table } => Some(*table),
            _ => None,
        })
    }

    pub fn written_metadata(&self) -> Option<Metadata> {
        self.instructions.iter().find_map(|i| match i {
            Instruction::WriteMetadata { value, .. } => Some(*value),
            _ => None,
        })
    }

    pub fn vlan_rewrite(&self) -> Option<VlanId> {
        self.instructions.iter().find_map(|i| match i {
            Instruction::SetVlanId { vlan } => Some(*vlan),
            _ => None,
        })
    }
}

impl fmt::Display for TrafficTreatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.instructions.iter().map(|i| i.to_string()).collect();
        let kind = if self.immediate { "immediate" } else { "deferred" };
        write!(f, "{}[{}]", kind, parts.join(", "))
    }
}

/// Identity under which the flow-rule service stores a rule.
///
/// Criteria are kept sorted, so selectors listing the same conditions in a
/// different order map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowRuleKey {
    pub device_id: DeviceId,
    pub app_id: u16,
    pub table: u8,
    pub priority: u16,
    pub criteria: Vec<Criterion>,
}

/// A match-action rule for one table of one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRule {
    pub device_id: DeviceId,
    pub app_id: ApplicationId,
    pub table: u8,
    pub priority: u16,
    /// Permanent rules have no idle or hard timeout.
    pub permanent: bool,
    /// Timeout in seconds for non-permanent rules.
    pub timeout: u32,
    pub selector: TrafficSelector,
    pub treatment: TrafficTreatment,
}

impl FlowRule {
    /// Creates an empty, non-permanent rule at priority 0.
    pub fn new(device_id: DeviceId, app_id: ApplicationId, table: u8) -> Self {
        Self {
            device_id,
            app_id,
            table,
            priority: 0,
            permanent: false,
            timeout: 0,
            selector: TrafficSelector::default(),
            treatment: TrafficTreatment::default(),
        }
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn make_permanent(mut self) -> Self {
        self.permanent = true;
        self.timeout = 0;
        self
    }

    pub fn with_selector(mut self, selector: TrafficSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_treatment(mut self, treatment: TrafficTreatment) -> Self {
        self.treatment = treatment;
        self
    }

    /// Returns the identity the flow-rule service keys this rule by.
    pub fn key(&self) -> FlowRuleKey {
        let mut criteria = self.selector.criteria().to_vec();
        criteria.sort_unstable();
        FlowRuleKey {
            device_id: self.device_id,
            app_id: self.app_id.id,
            table: self.table,
            priority: self.priority,
            criteria,
        }
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} table={} priority={} match={} actions={}",
            self.device_id, self.table, self.priority, self.selector, self.treatment
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule() -> FlowRule {
        FlowRule::new(
            DeviceId::from_dpid(0x0a0a0a0a0a0a),
            ApplicationId::new(1, "org.opencord.olt"),
            0,
        )
    }

    #[test]
    fn test_selector_replaces_same_kind() {
        let selector = TrafficSelector::new()
            .match_in_port(PortNumber::new(256))
            .match_vlan_id(VlanId::new(6).unwrap())
            .match_vlan_id(VlanId::new(101).unwrap());

        assert_eq!(selector.criteria().len(), 2);
        assert_eq!(selector.vlan_id(), Some(VlanId::new(101).unwrap()));
        assert_eq!(selector.in_port(), Some(PortNumber::new(256)));
        assert_eq!(selector.metadata(), None);
    }

    #[test]
    fn test_treatment_keeps_instruction_order() {
        let treatment = TrafficTreatment::new()
            .immediate()
            .set_vlan_id(VlanId::new(60).unwrap())
            .meter(MeterId::new(3))
            .transition(1);

        assert_eq!(
            treatment.instructions(),
            &[
                Instruction::SetVlanId { vlan: VlanId::new(60).unwrap() },
                Instruction::Meter { meter_id: MeterId::new(3) },
                Instruction::Transition { table: 1 },
            ]
        );
        assert_eq!(treatment.meter_id(), Some(MeterId::new(3)));
        assert_eq!(treatment.transition_table(), Some(1));
        assert_eq!(treatment.output(), None);
    }

    #[test]
    fn test_rule_key_ignores_treatment() {
        let selector = TrafficSelector::new().match_in_port(PortNumber::new(256));
        let a = rule()
            .with_priority(1000)
            .with_selector(selector.clone())
            .with_treatment(TrafficTreatment::new().transition(1));
        let b = rule()
            .with_priority(1000)
            .with_selector(selector)
            .with_treatment(TrafficTreatment::new().set_output(PortNumber::new(1)));

        assert_ne!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_rule_key_ignores_criteria_order() {
        let port = PortNumber::new(256);
        let vlan = VlanId::new(101).unwrap();
        let a = rule()
            .with_priority(1000)
            .with_selector(TrafficSelector::new().match_in_port(port).match_vlan_id(vlan));
        let b = rule()
            .with_priority(1000)
            .with_selector(TrafficSelector::new().match_vlan_id(vlan).match_in_port(port));

        assert_ne!(a.selector, b.selector);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), b.clone().with_priority(999).key());
    }

    #[test]
    fn test_make_permanent() {
        let r = rule().make_permanent();
        assert!(r.permanent);
        assert_eq!(r.timeout, 0);
    }

    #[test]
    fn test_display() {
        let r = rule()
            .with_priority(40000)
            .with_selector(TrafficSelector::new().match_udp_src(67))
            .with_treatment(TrafficTreatment::new().immediate().set_output(PortNumber::CONTROLLER));
        assert_eq!(
            r.to_string(),
            "of:00000a0a0a0a0a0a table=0 priority=40000 match=[UDP_SRC:67] actions=immediate[OUTPUT:CONTROLLER]"
        );
    }
}
