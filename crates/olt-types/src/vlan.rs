//! VLAN identifier and priority types.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 802.1Q VLAN identifier as carried in OpenFlow `VLAN_VID` matches.
///
/// Regular identifiers occupy 12 bits (0-4095). Two sentinels sit outside
/// that range: [`VlanId::ANY`] (4096, wildcard) and [`VlanId::NONE`]
/// (0xffff, untagged / absent).
///
/// # Examples
///
/// ```
/// use olt_types::VlanId;
///
/// let vlan = VlanId::new(3101).unwrap();
/// assert_eq!(vlan.as_u16(), 3101);
/// assert!(VlanId::NONE.is_none());
///
/// assert!(VlanId::new(4096).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Maximum regular VLAN ID (12 bits).
    pub const MAX: u16 = 0x0fff;

    /// Raw value of the wildcard sentinel.
    pub const ANY_VALUE: u16 = 0x1000;

    /// Raw value of the untagged sentinel.
    pub const UNTAGGED: u16 = 0xffff;

    /// Wildcard VLAN.
    pub const ANY: VlanId = VlanId(Self::ANY_VALUE);

    /// Absent VLAN (untagged traffic).
    pub const NONE: VlanId = VlanId(Self::UNTAGGED);

    /// VLAN 0: priority tagged, no VLAN membership.
    pub const PRIORITY_TAGGED: VlanId = VlanId(0);

    /// Creates a regular VLAN ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not fit in 12 bits.
    pub const fn new(id: u16) -> Result<Self, ParseError> {
        if id <= Self::MAX {
            Ok(VlanId(id))
        } else {
            Err(ParseError::InvalidVlanId(id))
        }
    }

    /// Returns the raw VLAN value.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns true for the untagged sentinel.
    pub const fn is_none(&self) -> bool {
        self.0 == Self::UNTAGGED
    }

    /// Returns true for the wildcard sentinel.
    pub const fn is_any(&self) -> bool {
        self.0 == Self::ANY_VALUE
    }

    /// Returns true if the value is a regular 12-bit identifier.
    pub const fn is_regular(&self) -> bool {
        self.0 <= Self::MAX
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Self::UNTAGGED => write!(f, "None"),
            Self::ANY_VALUE => write!(f, "Any"),
            id => write!(f, "{}", id),
        }
    }
}

impl FromStr for VlanId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::NONE),
            "any" => Ok(Self::ANY),
            other => {
                let id: u16 = other.parse().map_err(|_| ParseError::InvalidVlanId(0))?;
                VlanId::new(id)
            }
        }
    }
}

/// Accepts regular identifiers and both sentinels.
impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        match id {
            Self::ANY_VALUE | Self::UNTAGGED => Ok(VlanId(id)),
            _ => VlanId::new(id),
        }
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}

/// 802.1p priority code point (3 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct VlanPcp(u8);

impl VlanPcp {
    /// Maximum priority value.
    pub const MAX: u8 = 7;

    /// Creates a priority code point.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not fit in 3 bits.
    pub const fn new(pcp: u8) -> Result<Self, ParseError> {
        if pcp <= Self::MAX {
            Ok(VlanPcp(pcp))
        } else {
            Err(ParseError::InvalidVlanPcp(pcp))
        }
    }

    /// Returns the raw priority value.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for VlanPcp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for VlanPcp {
    type Error = ParseError;

    fn try_from(pcp: u8) -> Result<Self, Self::Error> {
        VlanPcp::new(pcp)
    }
}

impl From<VlanPcp> for u8 {
    fn from(pcp: VlanPcp) -> u8 {
        pcp.0
    }
}
