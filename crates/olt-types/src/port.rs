//! OpenFlow logical port numbers.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical OpenFlow port number.
///
/// Physical ports use values below [`PortNumber::MAX_PHYSICAL`]; the reserved
/// ports (`CONTROLLER`, `LOCAL`, ...) use the OpenFlow 1.3 encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortNumber(u64);

impl PortNumber {
    /// Highest port number usable by a physical port.
    pub const MAX_PHYSICAL: u64 = 0xffff_ff00;

    /// Send to the ingress port.
    pub const IN_PORT: PortNumber = PortNumber(0xffff_fff8);

    /// Punt to the controller.
    pub const CONTROLLER: PortNumber = PortNumber(0xffff_fffd);

    /// Local switch stack.
    pub const LOCAL: PortNumber = PortNumber(0xffff_fffe);

    /// Creates a port number.
    pub const fn new(number: u64) -> Self {
        PortNumber(number)
    }

    /// Returns the raw port number.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns true for reserved (non-physical) ports.
    pub const fn is_logical(&self) -> bool {
        self.0 > Self::MAX_PHYSICAL
    }

    fn reserved_name(&self) -> Option<&'static str> {
        match *self {
            Self::IN_PORT => Some("IN_PORT"),
            Self::CONTROLLER => Some("CONTROLLER"),
            Self::LOCAL => Some("LOCAL"),
            _ => None,
        }
    }
}

impl fmt::Display for PortNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reserved_name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for PortNumber {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IN_PORT" => Ok(Self::IN_PORT),
            "CONTROLLER" => Ok(Self::CONTROLLER),
            "LOCAL" => Ok(Self::LOCAL),
            other => other
                .parse::<u64>()
                .map(PortNumber)
                .map_err(|_| ParseError::InvalidPortNumber(s.to_string())),
        }
    }
}

impl From<u64> for PortNumber {
    fn from(number: u64) -> Self {
        PortNumber(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reserved_ports() {
        assert!(PortNumber::CONTROLLER.is_logical());
        assert!(PortNumber::LOCAL.is_logical());
        assert!(!PortNumber::new(256).is_logical());
        assert!(!PortNumber::new(16777216).is_logical());
    }

    #[test]
    fn test_display() {
        assert_eq!(PortNumber::new(256).to_string(), "256");
        assert_eq!(PortNumber::CONTROLLER.to_string(), "CONTROLLER");
    }

    #[test]
    fn test_parse() {
        assert_eq!("16777216".parse::<PortNumber>().unwrap(), PortNumber::new(16777216));
        assert_eq!("controller".parse::<PortNumber>().unwrap(), PortNumber::CONTROLLER);
        assert!("uni-1".parse::<PortNumber>().is_err());
    }
}
