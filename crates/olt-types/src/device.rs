//! OpenFlow device identifiers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const OF_SCHEME: &str = "of:";

/// OpenFlow device identifier of the form `of:<16 hex digits>`.
///
/// # Examples
///
/// ```
/// use olt_types::DeviceId;
///
/// let device: DeviceId = "of:00000a0a0a0a0a0a".parse().unwrap();
/// assert_eq!(device.dpid(), 0x0a0a_0a0a_0a0a);
/// assert_eq!(DeviceId::from_dpid(device.dpid()), device);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(u64);

impl DeviceId {
    /// Creates a device id from an OpenFlow datapath id.
    pub const fn from_dpid(dpid: u64) -> Self {
        DeviceId(dpid)
    }

    /// Returns the OpenFlow datapath id.
    pub const fn dpid(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:016x}", OF_SCHEME, self.0)
    }
}

impl FromStr for DeviceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix(OF_SCHEME)
            .ok_or_else(|| ParseError::InvalidDeviceId(s.to_string()))?;
        if hex.len() != 16 {
            return Err(ParseError::InvalidDeviceId(s.to_string()));
        }
        u64::from_str_radix(hex, 16)
            .map(DeviceId)
            .map_err(|_| ParseError::InvalidDeviceId(s.to_string()))
    }
}

impl TryFrom<String> for DeviceId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceId> for String {
    fn from(device: DeviceId) -> String {
        device.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_pads_to_sixteen_digits() {
        assert_eq!(DeviceId::from_dpid(1).to_string(), "of:0000000000000001");
    }

    #[test]
    fn test_parse_rejects_bad_ids() {
        assert!("00000a0a0a0a0a0a".parse::<DeviceId>().is_err());
        assert!("of:0a0a".parse::<DeviceId>().is_err());
        assert!("of:zzzzzzzzzzzzzzzz".parse::<DeviceId>().is_err());
    }

    #[test]
    fn test_serde_round_trip_through_string() {
        let device: DeviceId = serde_json::from_str("\"of:00000a0a0a0a0a0a\"").unwrap();
        assert_eq!(device.dpid(), 0x0a0a0a0a0a0a);
        assert_eq!(
            serde_json::to_string(&device).unwrap(),
            "\"of:00000a0a0a0a0a0a\""
        );
    }
}
