//! Value types for programming an OpenFlow access device (OLT).
//!
//! This crate provides type-safe representations of the primitives that
//! appear in OLT flow rules and meters:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`VlanId`]: 12-bit VLAN identifiers plus the `NONE`/`ANY` sentinels
//! - [`VlanPcp`]: 3-bit 802.1p priority code point
//! - [`PortNumber`]: logical OpenFlow port numbers, including reserved ports
//! - [`DeviceId`]: OpenFlow device identifiers (`of:<16 hex digits>`)

mod device;
mod mac;
mod port;
mod vlan;

pub use device::DeviceId;
pub use mac::MacAddress;
pub use port::PortNumber;
pub use vlan::{VlanId, VlanPcp};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid VLAN ID: {0} (must be 0-4095)")]
    InvalidVlanId(u16),

    #[error("invalid VLAN priority: {0} (must be 0-7)")]
    InvalidVlanPcp(u8),

    #[error("invalid port number: {0}")]
    InvalidPortNumber(String),

    #[error("invalid device id: {0}")]
    InvalidDeviceId(String),
}
