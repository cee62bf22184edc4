//! Write-metadata codec.
//!
//! The 64-bit OpenFlow metadata register carries context from the classify
//! table to the forward table:
//!
//! ```text
//!  63          48 47          32 31                          0
//! +--------------+--------------+-----------------------------+
//! |   VLAN id    | tech profile |   egress port or meter id   |
//! +--------------+--------------+-----------------------------+
//! ```
//!
//! [`encode_forwarding`] puts an egress port in the low 32 bits and is the
//! layout used by every rule of the two-table pipeline.
//! [`encode_service_key`] puts a meter id there; it is only written by
//! single-stage rules whose metadata no other rule matches.

use olt_types::{PortNumber, VlanId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::meter::MeterId;

const VLAN_SHIFT: u32 = 48;
const TECH_PROFILE_SHIFT: u32 = 32;
const LOW_MASK: u64 = 0xffff_ffff;
const FIELD_MASK: u64 = 0xffff;

/// Technology profile identifier.
///
/// [`TechProfileId::NONE`] is a sentinel meaning "no profile selected"; the
/// forwarding encoding replaces it with [`TechProfileId::DEFAULT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechProfileId(i32);

impl TechProfileId {
    /// No profile selected.
    pub const NONE: TechProfileId = TechProfileId(-1);

    /// Profile used when none is selected.
    pub const DEFAULT: TechProfileId = TechProfileId(64);

    /// Creates a profile id from its 16-bit wire value.
    pub const fn new(id: u16) -> Self {
        TechProfileId(id as i32)
    }

    /// Creates a profile id from an unchecked integer.
    pub const fn from_raw(id: i32) -> Self {
        TechProfileId(id)
    }

    /// Returns the raw value.
    pub const fn as_i32(&self) -> i32 {
        self.0
    }

    /// Returns the profile with the `NONE` sentinel replaced by the default.
    pub const fn normalized(self) -> Self {
        if self.0 == Self::NONE.0 {
            Self::DEFAULT
        } else {
            self
        }
    }

    fn wire_value(self) -> Result<u64, MetadataError> {
        u16::try_from(self.0)
            .map(u64::from)
            .map_err(|_| MetadataError::TechProfileOutOfRange(self.0))
    }
}

impl fmt::Display for TechProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A field did not fit its slot in the metadata layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("VLAN {0} does not fit in 12 bits")]
    VlanOutOfRange(u16),

    #[error("tech profile {0} does not fit in 16 bits")]
    TechProfileOutOfRange(i32),

    #[error("port {0} does not fit in 32 bits")]
    PortOutOfRange(u64),
}

/// Packed 64-bit write-metadata value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(u64);

impl Metadata {
    /// Wraps a raw register value.
    pub const fn from_raw(value: u64) -> Self {
        Metadata(value)
    }

    /// Returns the raw register value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// VLAN field (bits 48-63).
    pub const fn vlan(&self) -> u16 {
        ((self.0 >> VLAN_SHIFT) & FIELD_MASK) as u16
    }

    /// Tech-profile field (bits 32-47).
    pub const fn tech_profile(&self) -> u16 {
        ((self.0 >> TECH_PROFILE_SHIFT) & FIELD_MASK) as u16
    }

    /// Port or meter field (bits 0-31).
    pub const fn low(&self) -> u32 {
        (self.0 & LOW_MASK) as u32
    }

    /// Splits the value into its three fields.
    pub const fn decode(&self) -> MetadataFields {
        MetadataFields {
            vlan: self.vlan(),
            tech_profile: self.tech_profile(),
            low: self.low(),
        }
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Decoded metadata fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataFields {
    pub vlan: u16,
    pub tech_profile: u16,
    pub low: u32,
}

fn vlan_field(vlan: VlanId) -> Result<u64, MetadataError> {
    if vlan.is_regular() {
        Ok(u64::from(vlan.as_u16()) << VLAN_SHIFT)
    } else {
        Err(MetadataError::VlanOutOfRange(vlan.as_u16()))
    }
}

/// Fallible form of [`encode_forwarding`].
pub fn try_encode_forwarding(
    vlan: VlanId,
    tech_profile: TechProfileId,
    port: PortNumber,
) -> Result<Metadata, MetadataError> {
    let tp = tech_profile.normalized().wire_value()?;
    let port = port.as_u64();
    if port > LOW_MASK {
        return Err(MetadataError::PortOutOfRange(port));
    }
    Ok(Metadata(vlan_field(vlan)? | tp << TECH_PROFILE_SHIFT | port))
}

/// Packs `vlan << 48 | tech_profile << 32 | port`.
///
/// `TechProfileId::NONE` is normalized to the default profile first. Pass
/// port 0 when the rule has no egress port to record.
///
/// # Panics
///
/// Panics if a field overflows its slot. Pipeline constants are validated
/// when the configuration is loaded, so this only fires on a programming
/// error.
pub fn encode_forwarding(vlan: VlanId, tech_profile: TechProfileId, port: PortNumber) -> Metadata {
    match try_encode_forwarding(vlan, tech_profile, port) {
        Ok(metadata) => metadata,
        Err(e) => panic!("forwarding metadata contract violated: {}", e),
    }
}

/// Fallible form of [`encode_service_key`].
pub fn try_encode_service_key(
    c_vlan: Option<VlanId>,
    tech_profile: TechProfileId,
    meter_id: Option<MeterId>,
) -> Result<Metadata, MetadataError> {
    let mut value = tech_profile.wire_value()? << TECH_PROFILE_SHIFT;
    if let Some(vlan) = c_vlan.filter(|v| !v.is_none()) {
        value |= vlan_field(vlan)?;
    }
    if let Some(meter_id) = meter_id {
        value |= u64::from(meter_id.as_u32());
    }
    Ok(Metadata(value))
}

/// Packs `c_vlan << 48 | tech_profile << 32 | meter_id`.
///
/// An absent or `NONE` C-VLAN leaves the VLAN field zero; an absent meter
/// leaves the low 32 bits zero. The tech profile is not normalized.
///
/// # Panics
///
/// Panics if a field overflows its slot.
pub fn encode_service_key(
    c_vlan: Option<VlanId>,
    tech_profile: TechProfileId,
    meter_id: Option<MeterId>,
) -> Metadata {
    match try_encode_service_key(c_vlan, tech_profile, meter_id) {
        Ok(metadata) => metadata,
        Err(e) => panic!("service key metadata contract violated: {}", e),
    }
}
