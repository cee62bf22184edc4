//! FTTB rule set builder.
//!
//! The pipeline spans two tables. Table 0 classifies traffic, tags it and
//! writes metadata; table 1 forwards it. Each traffic class and direction is
//! one classify/forward pair linked by a transition to table 1, except the
//! DHCP traps, which punt to the controller from table 0.
//!
//! ```text
//!            table 0 (classify)                 table 1 (forward)
//! UNI ──> dhcp client trap ──> CONTROLLER
//! NNI ──> dhcp server trap ──> CONTROLLER
//! UNI ──> mgmt upstream classify ────────────> mgmt upstream forward ──────> NNI
//! NNI ──> mgmt downstream classify ──────────> mgmt downstream forward ────> UNI
//! UNI ──> subscriber upstream classify ──────> subscriber upstream forward ─> NNI
//! NNI ──> subscriber downstream classify ────> subscriber downstream fwd ──> UNI
//! ```
//!
//! Every metadata value written in this pipeline uses the forwarding layout
//! (`vlan | tech profile | egress port`), except the DHCP client trap which
//! writes a service key. No rule matches the trap's metadata.

use olt_types::{PortNumber, VlanId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::PipelineConfig;
use crate::flow::{FlowRule, TrafficSelector, TrafficTreatment};
use crate::metadata::{encode_forwarding, encode_service_key, Metadata};
use crate::meter::MeterId;
use crate::services::ApplicationId;

/// Table holding the classify rules.
pub const CLASSIFY_TABLE: u8 = 0;

/// Table holding the forward rules.
pub const FORWARD_TABLE: u8 = 1;

/// IPv4 ethertype.
pub const ETH_TYPE_IPV4: u16 = 0x0800;

/// UDP IP protocol number.
pub const IP_PROTO_UDP: u8 = 17;

/// DHCP client port.
pub const DHCP_CLIENT_PORT: u16 = 68;

/// DHCP server port.
pub const DHCP_SERVER_PORT: u16 = 67;

/// Mask used with every write-metadata instruction.
pub const WRITE_METADATA_MASK: u64 = 0;

/// Traffic class handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    Dhcp,
    MgmtAncp,
    Subscriber,
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrafficClass::Dhcp => "dhcp",
            TrafficClass::MgmtAncp => "mgmt/ancp",
            TrafficClass::Subscriber => "subscriber",
        })
    }
}

/// Traffic direction relative to the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// UNI to NNI.
    Upstream,
    /// NNI to UNI.
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        })
    }
}

/// Position of a rule in the rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSlot {
    DhcpClientTrap,
    DhcpServerTrap,
    MgmtUpstreamClassify,
    MgmtUpstreamForward,
    MgmtDownstreamClassify,
    MgmtDownstreamForward,
    SubscriberUpstreamClassify,
    SubscriberUpstreamForward,
    SubscriberDownstreamClassify,
    SubscriberDownstreamForward,
}

impl RuleSlot {
    /// Every slot, in rule set order.
    pub const ALL: [RuleSlot; 10] = [
        RuleSlot::DhcpClientTrap,
        RuleSlot::DhcpServerTrap,
        RuleSlot::MgmtUpstreamClassify,
        RuleSlot::MgmtUpstreamForward,
        RuleSlot::MgmtDownstreamClassify,
        RuleSlot::MgmtDownstreamForward,
        RuleSlot::SubscriberUpstreamClassify,
        RuleSlot::SubscriberUpstreamForward,
        RuleSlot::SubscriberDownstreamClassify,
        RuleSlot::SubscriberDownstreamForward,
    ];

    /// Index of the slot in the rule set.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn traffic_class(self) -> TrafficClass {
        match self {
            Self::DhcpClientTrap | Self::DhcpServerTrap => TrafficClass::Dhcp,
            Self::MgmtUpstreamClassify
            | Self::MgmtUpstreamForward
            | Self::MgmtDownstreamClassify
            | Self::MgmtDownstreamForward => TrafficClass::MgmtAncp,
            Self::SubscriberUpstreamClassify
            | Self::SubscriberUpstreamForward
            | Self::SubscriberDownstreamClassify
            | Self::SubscriberDownstreamForward => TrafficClass::Subscriber,
        }
    }

    pub const fn direction(self) -> Direction {
        match self {
            Self::DhcpClientTrap
            | Self::MgmtUpstreamClassify
            | Self::MgmtUpstreamForward
            | Self::SubscriberUpstreamClassify
            | Self::SubscriberUpstreamForward => Direction::Upstream,
            Self::DhcpServerTrap
            | Self::MgmtDownstreamClassify
            | Self::MgmtDownstreamForward
            | Self::SubscriberDownstreamClassify
            | Self::SubscriberDownstreamForward => Direction::Downstream,
        }
    }

    /// Table the slot's rule lives in.
    pub const fn table(self) -> u8 {
        match self {
            Self::MgmtUpstreamForward
            | Self::MgmtDownstreamForward
            | Self::SubscriberUpstreamForward
            | Self::SubscriberDownstreamForward => FORWARD_TABLE,
            _ => CLASSIFY_TABLE,
        }
    }

    pub const fn is_trap(self) -> bool {
        matches!(self, Self::DhcpClientTrap | Self::DhcpServerTrap)
    }

    /// Forward-table partner of a classify slot.
    pub const fn forward_partner(self) -> Option<RuleSlot> {
        match self {
            Self::MgmtUpstreamClassify => Some(Self::MgmtUpstreamForward),
            Self::MgmtDownstreamClassify => Some(Self::MgmtDownstreamForward),
            Self::SubscriberUpstreamClassify => Some(Self::SubscriberUpstreamForward),
            Self::SubscriberDownstreamClassify => Some(Self::SubscriberDownstreamForward),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DhcpClientTrap => "dhcp_client_trap",
            Self::DhcpServerTrap => "dhcp_server_trap",
            Self::MgmtUpstreamClassify => "mgmt_upstream_classify",
            Self::MgmtUpstreamForward => "mgmt_upstream_forward",
            Self::MgmtDownstreamClassify => "mgmt_downstream_classify",
            Self::MgmtDownstreamForward => "mgmt_downstream_forward",
            Self::SubscriberUpstreamClassify => "subscriber_upstream_classify",
            Self::SubscriberUpstreamForward => "subscriber_upstream_forward",
            Self::SubscriberDownstreamClassify => "subscriber_downstream_classify",
            Self::SubscriberDownstreamForward => "subscriber_downstream_forward",
        }
    }
}

impl fmt::Display for RuleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The complete rule set built for one meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRules {
    meter_id: MeterId,
    rules: Vec<FlowRule>,
}

impl PipelineRules {
    /// Meter every metered rule references.
    pub fn meter_id(&self) -> MeterId {
        self.meter_id
    }

    pub fn get(&self, slot: RuleSlot) -> &FlowRule {
        &self.rules[slot.index()]
    }

    pub fn as_slice(&self) -> &[FlowRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates rules with their slots, in rule set order.
    pub fn iter(&self) -> impl Iterator<Item = (RuleSlot, &FlowRule)> {
        RuleSlot::ALL.into_iter().zip(self.rules.iter())
    }

    /// Clones the rules for `slots`, in the order given.
    pub fn select(&self, slots: &[RuleSlot]) -> Vec<FlowRule> {
        slots.iter().map(|slot| self.get(*slot).clone()).collect()
    }
}

/// Classify slots in `slots` whose forward-table partner is not also listed.
///
/// Traffic matched by such a classifier goes to table 1 and finds no rule
/// there.
pub fn unpaired_classifiers(slots: &[RuleSlot]) -> Vec<RuleSlot> {
    slots
        .iter()
        .copied()
        .filter(|slot| matches!(slot.forward_partner(), Some(partner) if !slots.contains(&partner)))
        .collect()
}

/// Builds the FTTB rule set from a configuration.
#[derive(Debug, Clone)]
pub struct RuleSetBuilder<'a> {
    config: &'a PipelineConfig,
    app_id: ApplicationId,
}

impl<'a> RuleSetBuilder<'a> {
    /// Creates a builder for `config`, tagging rules with `app_id`.
    ///
    /// `config` must have passed [`PipelineConfig::validate`]; otherwise
    /// [`build`](Self::build) may panic on a field that does not fit its
    /// metadata slot.
    pub fn new(config: &'a PipelineConfig, app_id: ApplicationId) -> Self {
        Self { config, app_id }
    }

    /// Builds all ten rules. The result depends only on the configuration,
    /// the application id and `meter_id`.
    pub fn build(&self, meter_id: MeterId) -> PipelineRules {
        let rules = RuleSlot::ALL
            .iter()
            .map(|slot| self.build_slot(*slot, meter_id))
            .collect();
        PipelineRules { meter_id, rules }
    }

    fn build_slot(&self, slot: RuleSlot, meter_id: MeterId) -> FlowRule {
        let (selector, treatment) = match slot {
            RuleSlot::DhcpClientTrap => self.dhcp_client_trap(meter_id),
            RuleSlot::DhcpServerTrap => self.dhcp_server_trap(),
            RuleSlot::MgmtUpstreamClassify => self.mgmt_upstream_classify(meter_id),
            RuleSlot::MgmtUpstreamForward => self.mgmt_upstream_forward(meter_id),
            RuleSlot::MgmtDownstreamClassify => self.mgmt_downstream_classify(meter_id),
            RuleSlot::MgmtDownstreamForward => self.mgmt_downstream_forward(meter_id),
            RuleSlot::SubscriberUpstreamClassify => self.subscriber_upstream_classify(meter_id),
            RuleSlot::SubscriberUpstreamForward => self.subscriber_upstream_forward(meter_id),
            RuleSlot::SubscriberDownstreamClassify => {
                self.subscriber_downstream_classify(meter_id)
            }
            RuleSlot::SubscriberDownstreamForward => self.subscriber_downstream_forward(meter_id),
        };

        let priority = if slot.is_trap() {
            self.config.priorities.trap
        } else {
            self.config.priorities.forwarding
        };

        FlowRule::new(self.config.device_id, self.app_id.clone(), slot.table())
            .make_permanent()
            .with_priority(priority)
            .with_selector(selector)
            .with_treatment(treatment)
    }

    fn uni(&self) -> PortNumber {
        self.config.ports.uni
    }

    fn nni(&self) -> PortNumber {
        self.config.ports.nni
    }

    /// Metadata carried from a classify rule to its forward rule.
    fn classify_metadata(&self, vlan: VlanId, egress: PortNumber) -> Metadata {
        encode_forwarding(vlan, self.config.tech_profile(), egress)
    }

    /// Metadata written by forward rules, which have nothing left to pass on.
    fn forward_metadata(&self) -> Metadata {
        encode_forwarding(
            VlanId::PRIORITY_TAGGED,
            self.config.tech_profile(),
            PortNumber::new(0),
        )
    }

    fn dhcp_client_trap(&self, meter_id: MeterId) -> (TrafficSelector, TrafficTreatment) {
        let vlans = &self.config.vlans;
        let selector = TrafficSelector::new()
            .match_in_port(self.uni())
            .match_vlan_id(vlans.access_vlan)
            .match_eth_type(ETH_TYPE_IPV4)
            .match_ip_protocol(IP_PROTO_UDP)
            .match_udp_src(DHCP_CLIENT_PORT);
        let service_key = encode_service_key(
            Some(vlans.network_vlan),
            self.config.tech_profile(),
            Some(meter_id),
        );
        let treatment = TrafficTreatment::new()
            .immediate()
            .set_output(PortNumber::CONTROLLER)
            .write_metadata(service_key, WRITE_METADATA_MASK)
            .meter(meter_id)
            .set_vlan_id(vlans.network_vlan);
        (selector, treatment)
    }

    fn dhcp_server_trap(&self) -> (TrafficSelector, TrafficTreatment) {
        let selector = TrafficSelector::new()
            .match_in_port(self.nni())
            .match_vlan_id(self.config.vlans.network_vlan)
            .match_eth_type(ETH_TYPE_IPV4)
            .match_ip_protocol(IP_PROTO_UDP)
            .match_udp_src(DHCP_SERVER_PORT);
        let treatment = TrafficTreatment::new()
            .immediate()
            .set_output(PortNumber::CONTROLLER);
        (selector, treatment)
    }

    fn mgmt_upstream_classify(&self, meter_id: MeterId) -> (TrafficSelector, TrafficTreatment) {
        let vlans = &self.config.vlans;
        let selector = TrafficSelector::new()
            .match_in_port(self.uni())
            .match_vlan_id(vlans.access_vlan)
            .match_vlan_pcp(vlans.mgmt_upstream_pcp);
        let treatment = TrafficTreatment::new()
            .immediate()
            .set_vlan_id(vlans.network_vlan)
            .set_vlan_pcp(vlans.mgmt_network_pcp)
            .write_metadata(self.upstream_metadata(), WRITE_METADATA_MASK)
            .meter(meter_id)
            .transition(FORWARD_TABLE);
        (selector, treatment)
    }

    fn mgmt_upstream_forward(&self, meter_id: MeterId) -> (TrafficSelector, TrafficTreatment) {
        let selector = TrafficSelector::new()
            .match_in_port(self.uni())
            .match_vlan_id(self.config.vlans.access_vlan)
            .match_eth_src(self.config.dpu_mac);
        let treatment = TrafficTreatment::new()
            .immediate()
            .set_output(self.nni())
            .write_metadata(self.forward_metadata(), WRITE_METADATA_MASK)
            .meter(meter_id);
        (selector, treatment)
    }

    fn mgmt_downstream_selector(&self) -> TrafficSelector {
        TrafficSelector::new()
            .match_in_port(self.nni())
            .match_vlan_id(self.config.vlans.access_vlan)
            .match_eth_dst(self.config.dpu_mac)
    }

    fn mgmt_downstream_classify(&self, meter_id: MeterId) -> (TrafficSelector, TrafficTreatment) {
        let metadata = self.classify_metadata(self.config.vlans.access_vlan, self.uni());
        let treatment = TrafficTreatment::new()
            .immediate()
            .write_metadata(metadata, WRITE_METADATA_MASK)
            .meter(meter_id)
            .transition(FORWARD_TABLE);
        (self.mgmt_downstream_selector(), treatment)
    }

    fn mgmt_downstream_forward(&self, meter_id: MeterId) -> (TrafficSelector, TrafficTreatment) {
        let treatment = TrafficTreatment::new()
            .immediate()
            .set_vlan_id(self.config.vlans.mgmt_downstream_vlan)
            .set_output(self.uni())
            .write_metadata(self.forward_metadata(), WRITE_METADATA_MASK)
            .meter(meter_id);
        (self.mgmt_downstream_selector(), treatment)
    }

    fn subscriber_upstream_selector(&self) -> TrafficSelector {
        TrafficSelector::new()
            .match_in_port(self.uni())
            .match_vlan_id(self.config.vlans.subscriber_c_vlan)
    }

    fn subscriber_upstream_classify(
        &self,
        meter_id: MeterId,
    ) -> (TrafficSelector, TrafficTreatment) {
        let treatment = TrafficTreatment::new()
            .immediate()
            .write_metadata(self.upstream_metadata(), WRITE_METADATA_MASK)
            .meter(meter_id)
            .transition(FORWARD_TABLE);
        (self.subscriber_upstream_selector(), treatment)
    }

    fn subscriber_upstream_forward(&self, meter_id: MeterId) -> (TrafficSelector, TrafficTreatment) {
        let treatment = TrafficTreatment::new()
            .immediate()
            .set_vlan_id(self.config.vlans.subscriber_s_vlan)
            .set_output(self.nni())
            .write_metadata(self.forward_metadata(), WRITE_METADATA_MASK)
            .meter(meter_id);
        (self.subscriber_upstream_selector(), treatment)
    }

    /// Metadata written by the subscriber downstream classify rule and
    /// matched by its forward rule.
    fn subscriber_downstream_metadata(&self) -> Metadata {
        self.classify_metadata(self.config.vlans.subscriber_s_vlan, self.uni())
    }

    fn subscriber_downstream_classify(
        &self,
        meter_id: MeterId,
    ) -> (TrafficSelector, TrafficTreatment) {
        let vlans = &self.config.vlans;
        let selector = TrafficSelector::new()
            .match_in_port(self.nni())
            .match_vlan_id(vlans.subscriber_s_vlan);
        let treatment = TrafficTreatment::new()
            .immediate()
            .set_vlan_id(vlans.subscriber_c_vlan)
            .write_metadata(self.subscriber_downstream_metadata(), WRITE_METADATA_MASK)
            .meter(meter_id)
            .transition(FORWARD_TABLE);
        (selector, treatment)
    }

    fn subscriber_downstream_forward(
        &self,
        meter_id: MeterId,
    ) -> (TrafficSelector, TrafficTreatment) {
        let selector = TrafficSelector::new()
            .match_in_port(self.nni())
            .match_metadata(self.subscriber_downstream_metadata())
            .match_vlan_id(self.config.vlans.subscriber_s_vlan);
        let treatment = TrafficTreatment::new()
            .immediate()
            .set_output(self.uni())
            .write_metadata(self.forward_metadata(), WRITE_METADATA_MASK)
            .meter(meter_id);
        (selector, treatment)
    }

    /// Upstream classify rules record the NNI as egress and no VLAN.
    fn upstream_metadata(&self) -> Metadata {
        self.classify_metadata(VlanId::PRIORITY_TAGGED, self.nni())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Criterion, Instruction};
    use crate::metadata::TechProfileId;
    use olt_types::VlanPcp;
    use pretty_assertions::assert_eq;

    const METER: MeterId = MeterId::new(7);

    fn app() -> ApplicationId {
        ApplicationId::new(42, "org.opencord.olt")
    }

    fn build(config: &PipelineConfig, meter_id: MeterId) -> PipelineRules {
        RuleSetBuilder::new(config, app()).build(meter_id)
    }

    fn vlan(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    #[test]
    fn test_ten_rules_in_slot_order() {
        let rules = build(&PipelineConfig::default(), METER);
        assert_eq!(rules.len(), 10);
        for (index, (slot, rule)) in rules.iter().enumerate() {
            assert_eq!(slot.index(), index);
            assert_eq!(rule.table, slot.table());
            assert!(rule.permanent, "{} must be permanent", slot);
            assert_eq!(rule.device_id, crate::config::DEFAULT_DEVICE_ID);
            assert_eq!(rule.app_id, app());
        }
    }

    #[test]
    fn test_priorities() {
        let rules = build(&PipelineConfig::default(), METER);
        let traps: Vec<RuleSlot> = rules
            .iter()
            .filter(|(_, rule)| rule.priority == 40000)
            .map(|(slot, _)| slot)
            .collect();
        assert_eq!(traps, vec![RuleSlot::DhcpClientTrap, RuleSlot::DhcpServerTrap]);
        assert_eq!(
            rules.iter().filter(|(_, rule)| rule.priority == 1000).count(),
            8
        );
    }

    #[test]
    fn test_every_meter_action_references_meter() {
        let meter_id = MeterId::new(0x1234);
        let rules = build(&PipelineConfig::default(), meter_id);
        assert_eq!(rules.meter_id(), meter_id);
        for (slot, rule) in rules.iter() {
            match slot {
                RuleSlot::DhcpServerTrap => assert_eq!(rule.treatment.meter_id(), None),
                _ => assert_eq!(rule.treatment.meter_id(), Some(meter_id), "{}", slot),
            }
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let config = PipelineConfig::default();
        assert_eq!(build(&config, METER), build(&config, METER));
        assert_ne!(build(&config, METER), build(&config, MeterId::new(8)));
    }

    #[test]
    fn test_dhcp_client_trap() {
        let config = PipelineConfig::default();
        let rules = build(&config, METER);
        let rule = rules.get(RuleSlot::DhcpClientTrap);

        assert_eq!(
            rule.selector.criteria(),
            &[
                Criterion::InPort(PortNumber::new(256)),
                Criterion::VlanVid(vlan(6)),
                Criterion::EthType(0x0800),
                Criterion::IpProto(17),
                Criterion::UdpSrc(68),
            ]
        );
        assert!(rule.treatment.immediate);
        assert_eq!(
            rule.treatment.instructions(),
            &[
                Instruction::Output {
                    port: PortNumber::CONTROLLER
                },
                Instruction::WriteMetadata {
                    value: encode_service_key(Some(vlan(60)), TechProfileId::DEFAULT, Some(METER)),
                    mask: 0,
                },
                Instruction::Meter { meter_id: METER },
                Instruction::SetVlanId { vlan: vlan(60) },
            ]
        );
        assert_eq!(
            rule.treatment.written_metadata().map(|m| m.as_u64()),
            Some((60u64 << 48) | (64u64 << 32) | 7)
        );
    }

    #[test]
    fn test_dhcp_server_trap() {
        let rules = build(&PipelineConfig::default(), METER);
        let rule = rules.get(RuleSlot::DhcpServerTrap);
        assert_eq!(rule.selector.in_port(), Some(PortNumber::new(16777216)));
        assert_eq!(rule.selector.vlan_id(), Some(vlan(60)));
        assert!(rule.selector.criteria().contains(&Criterion::UdpSrc(67)));
        assert_eq!(
            rule.treatment.instructions(),
            &[Instruction::Output {
                port: PortNumber::CONTROLLER
            }]
        );
    }

    #[test]
    fn test_mgmt_upstream_classify() {
        let rules = build(&PipelineConfig::default(), METER);
        let rule = rules.get(RuleSlot::MgmtUpstreamClassify);
        assert_eq!(
            rule.selector.criteria(),
            &[
                Criterion::InPort(PortNumber::new(256)),
                Criterion::VlanVid(vlan(6)),
                Criterion::VlanPcp(VlanPcp::new(3).unwrap()),
            ]
        );
        assert_eq!(
            rule.treatment.instructions(),
            &[
                Instruction::SetVlanId { vlan: vlan(60) },
                Instruction::SetVlanPcp {
                    pcp: VlanPcp::new(7).unwrap()
                },
                Instruction::WriteMetadata {
                    value: Metadata::from_raw((64u64 << 32) | 16777216),
                    mask: 0,
                },
                Instruction::Meter { meter_id: METER },
                Instruction::Transition { table: 1 },
            ]
        );
    }

    #[test]
    fn test_mgmt_forward_rules() {
        let config = PipelineConfig::default();
        let rules = build(&config, METER);

        let upstream = rules.get(RuleSlot::MgmtUpstreamForward);
        assert!(upstream
            .selector
            .criteria()
            .contains(&Criterion::EthSrc(config.dpu_mac)));
        assert_eq!(upstream.treatment.output(), Some(PortNumber::new(16777216)));
        assert_eq!(upstream.treatment.transition_table(), None);

        let classify = rules.get(RuleSlot::MgmtDownstreamClassify);
        let forward = rules.get(RuleSlot::MgmtDownstreamForward);
        assert_eq!(classify.selector, forward.selector);
        assert!(forward
            .selector
            .criteria()
            .contains(&Criterion::EthDst(config.dpu_mac)));
        assert_eq!(classify.treatment.transition_table(), Some(FORWARD_TABLE));
        assert_eq!(forward.treatment.vlan_rewrite(), Some(vlan(4)));
        assert_eq!(forward.treatment.output(), Some(PortNumber::new(256)));
    }

    #[test]
    fn test_subscriber_vlan_translation() {
        let rules = build(&PipelineConfig::default(), METER);

        let up_classify = rules.get(RuleSlot::SubscriberUpstreamClassify);
        assert_eq!(up_classify.selector.vlan_id(), Some(vlan(101)));
        assert_eq!(up_classify.treatment.vlan_rewrite(), None);

        let up_forward = rules.get(RuleSlot::SubscriberUpstreamForward);
        assert_eq!(up_forward.treatment.vlan_rewrite(), Some(vlan(3101)));
        assert_eq!(up_forward.treatment.output(), Some(PortNumber::new(16777216)));

        let down_classify = rules.get(RuleSlot::SubscriberDownstreamClassify);
        assert_eq!(down_classify.selector.vlan_id(), Some(vlan(3101)));
        assert_eq!(down_classify.treatment.vlan_rewrite(), Some(vlan(101)));

        let down_forward = rules.get(RuleSlot::SubscriberDownstreamForward);
        assert_eq!(down_forward.selector.vlan_id(), Some(vlan(3101)));
        assert_eq!(down_forward.treatment.output(), Some(PortNumber::new(256)));
    }

    #[test]
    fn test_downstream_forward_matches_classify_metadata() {
        let rules = build(&PipelineConfig::default(), METER);
        let written = rules
            .get(RuleSlot::SubscriberDownstreamClassify)
            .treatment
            .written_metadata();
        let matched = rules
            .get(RuleSlot::SubscriberDownstreamForward)
            .selector
            .metadata();
        assert_eq!(written, matched);

        let fields = matched.unwrap().decode();
        assert_eq!(fields.vlan, 3101);
        assert_eq!(fields.tech_profile, 64);
        assert_eq!(fields.low, 256);
    }

    #[test]
    fn test_forward_rules_clear_metadata_context() {
        let rules = build(&PipelineConfig::default(), METER);
        for (slot, rule) in rules.iter().filter(|(slot, _)| slot.table() == FORWARD_TABLE) {
            let fields = rule.treatment.written_metadata().unwrap().decode();
            assert_eq!((fields.vlan, fields.tech_profile, fields.low), (0, 64, 0), "{}", slot);
        }
    }

    #[test]
    fn test_tech_profile_none_is_normalized() {
        let mut config = PipelineConfig::default();
        config.tech_profile_id = TechProfileId::NONE;
        assert_eq!(build(&config, METER), build(&PipelineConfig::default(), METER));
    }

    #[test]
    fn test_select_keeps_requested_order() {
        let rules = build(&PipelineConfig::default(), METER);
        let picked = rules.select(&[RuleSlot::MgmtUpstreamClassify, RuleSlot::DhcpServerTrap]);
        assert_eq!(picked.len(), 2);
        assert_eq!(&picked[0], rules.get(RuleSlot::MgmtUpstreamClassify));
        assert_eq!(&picked[1], rules.get(RuleSlot::DhcpServerTrap));
    }

    #[test]
    fn test_slot_classification() {
        assert_eq!(RuleSlot::DhcpClientTrap.traffic_class(), TrafficClass::Dhcp);
        assert_eq!(RuleSlot::MgmtDownstreamForward.traffic_class(), TrafficClass::MgmtAncp);
        assert_eq!(RuleSlot::SubscriberUpstreamForward.direction(), Direction::Upstream);
        assert_eq!(RuleSlot::DhcpServerTrap.direction(), Direction::Downstream);
        assert_eq!(
            RuleSlot::SubscriberDownstreamClassify.forward_partner(),
            Some(RuleSlot::SubscriberDownstreamForward)
        );
        assert_eq!(RuleSlot::DhcpClientTrap.forward_partner(), None);
        assert_eq!(RuleSlot::ALL.iter().filter(|s| s.is_trap()).count(), 2);
    }

    #[test]
    fn test_traffic_class_and_direction_names() {
        let slot = RuleSlot::MgmtDownstreamClassify;
        assert_eq!(
            format!("{} {} {}", slot, slot.traffic_class(), slot.direction()),
            "mgmt_downstream_classify mgmt/ancp downstream"
        );
        assert_eq!(TrafficClass::Dhcp.to_string(), "dhcp");
        assert_eq!(TrafficClass::Subscriber.to_string(), "subscriber");
        assert_eq!(Direction::Upstream.to_string(), "upstream");
    }

    #[test]
    fn test_unpaired_classifiers() {
        // Default subset installs the mgmt upstream classifier on its own.
        assert_eq!(
            unpaired_classifiers(&PipelineConfig::default().installed_rules),
            vec![RuleSlot::MgmtUpstreamClassify]
        );
        assert!(unpaired_classifiers(&RuleSlot::ALL).is_empty());
        assert!(unpaired_classifiers(&[
            RuleSlot::DhcpClientTrap,
            RuleSlot::SubscriberUpstreamForward,
            RuleSlot::SubscriberUpstreamClassify,
        ])
        .is_empty());
        assert_eq!(
            unpaired_classifiers(&[
                RuleSlot::SubscriberDownstreamClassify,
                RuleSlot::MgmtDownstreamForward,
            ]),
            vec![RuleSlot::SubscriberDownstreamClassify]
        );
    }

    #[test]
    fn test_rule_set_serializes_for_dump() {
        let rules = build(&PipelineConfig::default(), METER);
        let value = serde_json::to_value(&rules).unwrap();
        assert_eq!(value["meter_id"], serde_json::json!(7));
        assert_eq!(value["rules"].as_array().map(Vec::len), Some(10));
        assert_eq!(value["rules"][1]["priority"], serde_json::json!(40000));
    }

    #[test]
    fn test_slot_serde_names() {
        let json = serde_json::to_string(&RuleSlot::MgmtUpstreamClassify).unwrap();
        assert_eq!(json, "\"mgmt_upstream_classify\"");
        for slot in RuleSlot::ALL {
            let parsed: RuleSlot = serde_json::from_str(&format!("\"{}\"", slot)).unwrap();
            assert_eq!(parsed, slot);
        }
    }
}
