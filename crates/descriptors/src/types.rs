//! USB descriptor and topology types
//!
//! The `*Descriptor` structs mirror the standard USB descriptor records field
//! for field, including the raw `length` and `descriptor_type` bytes, so a
//! parsed record can be written back out unchanged. The `*Info` structs are the
//! tree the parser builds on top of them.

use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Standard device descriptor (18 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// bLength
    pub length: u8,
    /// bDescriptorType (always 1)
    pub descriptor_type: u8,
    /// bcdUSB
    pub usb_version: u16,
    /// bDeviceClass
    pub device_class: u8,
    /// bDeviceSubClass
    pub device_subclass: u8,
    /// bDeviceProtocol
    pub device_protocol: u8,
    /// bMaxPacketSize0
    pub max_packet_size0: u8,
    /// idVendor
    pub vendor_id: u16,
    /// idProduct
    pub product_id: u16,
    /// bcdDevice
    pub device_version: u16,
    /// iManufacturer
    pub manufacturer_index: u8,
    /// iProduct
    pub product_index: u8,
    /// iSerialNumber
    pub serial_number_index: u8,
    /// bNumConfigurations
    pub num_configurations: u8,
}

/// Standard configuration descriptor header (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    /// wTotalLength: header plus every interface, endpoint and
    /// class-specific record belonging to this configuration
    pub total_length: u16,
    /// bNumInterfaces (alternate settings are not counted)
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub configuration_index: u8,
    pub attributes: u8,
    /// bMaxPower in 2 mA units (8 mA for SuperSpeed)
    pub max_power: u8,
}

impl ConfigDescriptor {
    /// bmAttributes bit 6
    pub fn self_powered(&self) -> bool {
        self.attributes & 0x40 != 0
    }

    /// bmAttributes bit 5
    pub fn remote_wakeup(&self) -> bool {
        self.attributes & 0x20 != 0
    }
}

/// Standard interface descriptor (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub interface_index: u8,
}

/// Standard endpoint descriptor (7 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    /// bEndpointAddress: bit 7 is the direction, bits 0-3 the endpoint number
    pub address: u8,
    /// bmAttributes: bits 0-1 are the transfer type
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

/// Endpoint data direction, seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Device to host (address bit 7 set)
    In,
    /// Host to device
    Out,
}

/// Endpoint transfer type (bmAttributes bits 0-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl EndpointDescriptor {
    /// Direction bit of the endpoint address
    pub const ADDRESS_IN: u8 = 0x80;
    /// Mask for the transfer type bits of bmAttributes
    pub const TRANSFER_TYPE_MASK: u8 = 0x03;

    pub fn direction(&self) -> Direction {
        if self.address & Self::ADDRESS_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// Endpoint number without the direction bit
    pub fn number(&self) -> u8 {
        self.address & 0x0f
    }

    pub fn transfer_type(&self) -> TransferType {
        match self.attributes & Self::TRANSFER_TYPE_MASK {
            0 => TransferType::Control,
            1 => TransferType::Isochronous,
            2 => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }
}

/// Parsed device topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub descriptor: DeviceDescriptor,
    /// One entry per declared configuration, in descriptor order
    pub configs: Vec<ConfigInfo>,
}

/// One configuration and its interfaces
///
/// Records the parser does not decode (class-specific and vendor records,
/// trailing padding) are kept as raw bytes next to the record they follow,
/// so encoding the tree reproduces a block with the same `total_length`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    pub descriptor: ConfigDescriptor,
    /// Every interface record in the configuration, alternate settings as
    /// separate entries
    pub interfaces: Vec<InterfaceInfo>,
    /// Raw bytes following the configuration header, before the first
    /// interface (or the whole body when there are no interfaces)
    #[serde(default)]
    pub extra: Vec<u8>,
}

/// One interface alternate setting and its endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub descriptor: InterfaceDescriptor,
    pub endpoints: Vec<EndpointDescriptor>,
    /// Raw bytes following the interface descriptor, e.g. a HID or CDC
    /// functional descriptor
    #[serde(default)]
    pub extra: Vec<u8>,
    /// Raw bytes following each endpoint, by endpoint index; missing entries
    /// are empty
    #[serde(default)]
    pub endpoint_extra: Vec<Vec<u8>>,
}

impl DeviceInfo {
    /// Find a configuration by its bConfigurationValue
    pub fn config(&self, configuration_value: u8) -> Option<&ConfigInfo> {
        self.configs
            .iter()
            .find(|c| c.descriptor.configuration_value == configuration_value)
    }

    /// Find the first endpoint with the given address in any configuration
    /// and interface, together with the interface that owns it
    pub fn find_endpoint(&self, address: u8) -> Option<(&InterfaceInfo, &EndpointDescriptor)> {
        self.configs
            .iter()
            .flat_map(|c| c.interfaces.iter())
            .find_map(|i| i.endpoint(address).map(|e| (i, e)))
    }
}

impl ConfigInfo {
    /// Look up an interface by number and alternate setting
    pub fn interface(&self, number: u8, alternate_setting: u8) -> Option<&InterfaceInfo> {
        self.interfaces.iter().find(|i| {
            i.descriptor.interface_number == number
                && i.descriptor.alternate_setting == alternate_setting
        })
    }
}

impl InterfaceInfo {
    pub fn endpoint(&self, address: u8) -> Option<&EndpointDescriptor> {
        self.endpoints.iter().find(|e| e.address == address)
    }
}

impl Deref for DeviceInfo {
    type Target = DeviceDescriptor;

    fn deref(&self) -> &DeviceDescriptor {
        &self.descriptor
    }
}

impl Deref for ConfigInfo {
    type Target = ConfigDescriptor;

    fn deref(&self) -> &ConfigDescriptor {
        &self.descriptor
    }
}

impl Deref for InterfaceInfo {
    type Target = InterfaceDescriptor;

    fn deref(&self) -> &InterfaceDescriptor {
        &self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(address: u8, attributes: u8) -> EndpointDescriptor {
        EndpointDescriptor {
            length: 7,
            descriptor_type: 5,
            address,
            attributes,
            max_packet_size: 64,
            interval: 0,
        }
    }

    #[test]
    fn test_endpoint_direction() {
        assert_eq!(endpoint(0x81, 2).direction(), Direction::In);
        assert_eq!(endpoint(0x01, 2).direction(), Direction::Out);
        assert_eq!(endpoint(0x83, 3).number(), 3);
    }

    #[test]
    fn test_endpoint_transfer_type() {
        assert_eq!(endpoint(0x00, 0).transfer_type(), TransferType::Control);
        assert_eq!(endpoint(0x81, 1).transfer_type(), TransferType::Isochronous);
        assert_eq!(endpoint(0x81, 2).transfer_type(), TransferType::Bulk);
        assert_eq!(endpoint(0x81, 3).transfer_type(), TransferType::Interrupt);
        // Synchronisation/usage bits above bit 1 are ignored
        assert_eq!(endpoint(0x81, 0x0d).transfer_type(), TransferType::Isochronous);
    }

    #[test]
    fn test_interface_lookup_by_alternate_setting() {
        let iface = |number, alt| InterfaceInfo {
            descriptor: InterfaceDescriptor {
                length: 9,
                descriptor_type: 4,
                interface_number: number,
                alternate_setting: alt,
                num_endpoints: 0,
                interface_class: 0xff,
                interface_subclass: 0,
                interface_protocol: 0,
                interface_index: 0,
            },
            endpoints: Vec::new(),
            extra: Vec::new(),
            endpoint_extra: Vec::new(),
        };
        let config = ConfigInfo {
            descriptor: ConfigDescriptor {
                length: 9,
                descriptor_type: 2,
                total_length: 36,
                num_interfaces: 2,
                configuration_value: 1,
                configuration_index: 0,
                attributes: 0xc0,
                max_power: 50,
            },
            interfaces: vec![iface(0, 0), iface(1, 0), iface(1, 1)],
            extra: Vec::new(),
        };

        assert_eq!(config.interface(1, 1).map(|i| i.alternate_setting), Some(1));
        assert!(config.interface(2, 0).is_none());
        assert!(config.self_powered());
        assert!(!config.remote_wakeup());
    }
}
