//! USB descriptor parsing for usbfs-rs
//!
//! This crate turns the raw descriptor block a Linux USB device exposes through
//! sysfs (`/sys/bus/usb/devices/*/descriptors`) into a device topology:
//! configurations, their interfaces (alternate settings included) and each
//! interface's endpoints.
//!
//! Parsing is all-or-nothing. A single bad length, type tag or bounds violation
//! anywhere in the block fails the whole parse with [`MalformedDescriptor`]; a
//! partially built [`DeviceInfo`] is never returned.
//!
//! # Example
//!
//! ```
//! use descriptors::{parse, Direction, TransferType};
//!
//! let bytes = [
//!     // device
//!     18, 1, 0x00, 0x02, 0, 0, 0, 64, 0xd1, 0x18, 0xe7, 0x4e, 0x00, 0x01, 0, 0, 0, 1,
//!     // configuration (total length 25)
//!     9, 2, 25, 0, 1, 1, 0, 0x80, 0,
//!     // interface 0, one endpoint
//!     9, 4, 0, 0, 1, 0xff, 0, 0, 0,
//!     // bulk IN endpoint 0x81
//!     7, 5, 0x81, 2, 0x00, 0x02, 0,
//! ];
//!
//! let info = parse(&bytes).unwrap();
//! assert_eq!(info.vendor_id, 0x18d1);
//!
//! let endpoint = info.configs[0].interfaces[0].endpoints[0];
//! assert_eq!(endpoint.direction(), Direction::In);
//! assert_eq!(endpoint.transfer_type(), TransferType::Bulk);
//! ```

pub mod encode;
pub mod error;
pub mod parser;
pub mod types;

pub use error::{MalformedDescriptor, Result};
pub use parser::parse;
pub use types::{
    ConfigDescriptor, ConfigInfo, DeviceDescriptor, DeviceInfo, Direction, EndpointDescriptor,
    InterfaceDescriptor, InterfaceInfo, TransferType,
};

/// Descriptor type tags (`bDescriptorType`)
pub mod kind {
    pub const DEVICE: u8 = 0x01;
    pub const CONFIG: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const INTERFACE: u8 = 0x04;
    pub const ENDPOINT: u8 = 0x05;
    pub const DEVICE_QUALIFIER: u8 = 0x06;
    pub const OTHER_SPEED_CONFIG: u8 = 0x07;
    pub const INTERFACE_POWER: u8 = 0x08;
}

/// Standard descriptor sizes in bytes
pub mod size {
    pub const DEVICE: usize = 18;
    pub const CONFIG: usize = 9;
    pub const INTERFACE: usize = 9;
    pub const ENDPOINT: usize = 7;
    /// Audio-class endpoints append `bRefresh` and `bSynchAddress`
    pub const ENDPOINT_AUDIO: usize = 9;
}
