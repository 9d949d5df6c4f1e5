//! Test utilities for usbfs-rs
//!
//! Builders for synthetic descriptor blocks and helpers that lay out a fake
//! sysfs tree, shared by the descriptor and usbfs test suites.
//!
//! # Example
//!
//! ```
//! use common::test_utils::TopologyBuilder;
//!
//! let info = TopologyBuilder::new(0x1234, 0x5678)
//!     .config(1)
//!     .interface(0, 0, 0xff)
//!     .endpoint(0x81, 2, 512)
//!     .build();
//!
//! assert_eq!(info.configs[0].total_length, 25);
//! assert_eq!(descriptors::parse(&info.to_bytes()).unwrap(), info);
//! ```

use descriptors::{
    ConfigDescriptor, ConfigInfo, DeviceDescriptor, DeviceInfo, EndpointDescriptor,
    InterfaceDescriptor, InterfaceInfo, kind, size,
};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Bulk transfer type bits for endpoint attributes
pub const ATTR_BULK: u8 = 2;
/// Interrupt transfer type bits for endpoint attributes
pub const ATTR_INTERRUPT: u8 = 3;

/// Create a device descriptor with USB 2.0 defaults
pub fn device_descriptor(
    vendor_id: u16,
    product_id: u16,
    num_configurations: u8,
) -> DeviceDescriptor {
    DeviceDescriptor {
        length: size::DEVICE as u8,
        descriptor_type: kind::DEVICE,
        usb_version: 0x0200,
        device_class: 0,
        device_subclass: 0,
        device_protocol: 0,
        max_packet_size0: 64,
        vendor_id,
        product_id,
        device_version: 0x0100,
        manufacturer_index: 0,
        product_index: 0,
        serial_number_index: 0,
        num_configurations,
    }
}

/// Create an interface descriptor (endpoint count filled in by the builder)
pub fn interface_descriptor(number: u8, alternate_setting: u8, class: u8) -> InterfaceDescriptor {
    InterfaceDescriptor {
        length: size::INTERFACE as u8,
        descriptor_type: kind::INTERFACE,
        interface_number: number,
        alternate_setting,
        num_endpoints: 0,
        interface_class: class,
        interface_subclass: 0,
        interface_protocol: 0,
        interface_index: 0,
    }
}

/// Create an endpoint descriptor
pub fn endpoint_descriptor(address: u8, attributes: u8, max_packet_size: u16) -> EndpointDescriptor {
    EndpointDescriptor {
        length: size::ENDPOINT as u8,
        descriptor_type: kind::ENDPOINT,
        address,
        attributes,
        max_packet_size,
        interval: if attributes & 0x03 == ATTR_INTERRUPT { 10 } else { 0 },
    }
}

/// Incrementally build a consistent device topology
///
/// Counts and lengths (`num_configurations`, `num_interfaces`,
/// `num_endpoints`, `total_length`) are computed by [`TopologyBuilder::build`].
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    device: DeviceDescriptor,
    configs: Vec<ConfigInfo>,
}

impl TopologyBuilder {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            device: device_descriptor(vendor_id, product_id, 0),
            configs: Vec::new(),
        }
    }

    /// Start a new configuration
    pub fn config(mut self, configuration_value: u8) -> Self {
        self.configs.push(ConfigInfo {
            descriptor: ConfigDescriptor {
                length: size::CONFIG as u8,
                descriptor_type: kind::CONFIG,
                total_length: 0,
                num_interfaces: 0,
                configuration_value,
                configuration_index: 0,
                attributes: 0x80,
                max_power: 50,
            },
            interfaces: Vec::new(),
            extra: Vec::new(),
        });
        self
    }

    /// Add an interface (or alternate setting) to the current configuration
    pub fn interface(mut self, number: u8, alternate_setting: u8, class: u8) -> Self {
        let config = self
            .configs
            .last_mut()
            .expect("call config() before interface()");
        config.interfaces.push(InterfaceInfo {
            descriptor: interface_descriptor(number, alternate_setting, class),
            endpoints: Vec::new(),
            extra: Vec::new(),
            endpoint_extra: Vec::new(),
        });
        self
    }

    /// Add an endpoint to the current interface
    pub fn endpoint(mut self, address: u8, attributes: u8, max_packet_size: u16) -> Self {
        let interface = self
            .configs
            .last_mut()
            .and_then(|c| c.interfaces.last_mut())
            .expect("call interface() before endpoint()");
        interface
            .endpoints
            .push(endpoint_descriptor(address, attributes, max_packet_size));
        self
    }

    /// Append raw class-specific bytes after the most recently added record
    pub fn extra(mut self, bytes: &[u8]) -> Self {
        let config = self
            .configs
            .last_mut()
            .expect("call config() before extra()");
        let slot = match config.interfaces.last_mut() {
            None => &mut config.extra,
            Some(interface) if interface.endpoints.is_empty() => &mut interface.extra,
            Some(interface) => {
                let n = interface.endpoints.len();
                interface.endpoint_extra.resize_with(n, Vec::new);
                &mut interface.endpoint_extra[n - 1]
            }
        };
        slot.extend_from_slice(bytes);
        self
    }

    pub fn build(mut self) -> DeviceInfo {
        for config in &mut self.configs {
            for interface in &mut config.interfaces {
                interface.descriptor.num_endpoints = interface.endpoints.len() as u8;
            }
            let numbers: BTreeSet<u8> = config
                .interfaces
                .iter()
                .map(|i| i.descriptor.interface_number)
                .collect();
            config.descriptor.num_interfaces = numbers.len() as u8;
            config.descriptor.total_length = config.encoded_len() as u16;
        }
        self.device.num_configurations = self.configs.len() as u8;

        DeviceInfo {
            descriptor: self.device,
            configs: self.configs,
        }
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.build().to_bytes()
    }
}

/// Build an N x M x K topology: `configs` configurations, each with
/// `interfaces` interfaces, each with `endpoints` alternating bulk IN/OUT
/// endpoints
pub fn synthetic_topology(configs: u8, interfaces: u8, endpoints: u8) -> DeviceInfo {
    let mut builder = TopologyBuilder::new(0x1d6b, 0x0104);
    for c in 0..configs {
        builder = builder.config(c + 1);
        for i in 0..interfaces {
            builder = builder.interface(i, 0, 0xff);
            for e in 0..endpoints {
                let number = (e / 2 + 1) & 0x0f;
                let address = if e % 2 == 0 { 0x80 | number } else { number };
                builder = builder.endpoint(address, ATTR_BULK, 512);
            }
        }
    }
    builder.build()
}

/// Descriptor block of a single-configuration vendor-class device
/// (18d1:4ee7) with one bulk IN endpoint at 0x81
///
/// The configuration header declares a total length of 32, which leaves a
/// 7-byte class-specific record after the endpoint.
pub fn sample_descriptor_bytes() -> Vec<u8> {
    vec![
        // device: USB 2.0, max packet 64, 18d1:4ee7, bcdDevice 1.00, one config
        18, 1, 0x00, 0x02, 0, 0, 0, 64, 0xd1, 0x18, 0xe7, 0x4e, 0x00, 0x01, 0, 0, 0, 1,
        // configuration: total length 32, one interface, value 1, bus powered
        9, 2, 32, 0, 1, 1, 0, 0x80, 0,
        // interface 0, alt 0, one endpoint, vendor class
        9, 4, 0, 0, 1, 0xff, 0, 0, 0,
        // endpoint 0x81, bulk, 512 bytes
        7, 5, 0x81, 2, 0x00, 0x02, 0,
        // vendor-specific record filling the rest of the configuration
        7, 0x41, 0, 0, 0, 0, 0,
    ]
}

/// Write one device directory into a fake `/sys/bus/usb/devices` tree
///
/// Creates `<root>/<name>/{busnum,devnum,descriptors}` in the format the
/// kernel uses (decimal numbers with a trailing newline).
pub fn write_sysfs_device(
    root: &Path,
    name: &str,
    bus_number: u8,
    device_number: u8,
    descriptors: &[u8],
) -> io::Result<PathBuf> {
    let dir = root.join(name);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("busnum"), format!("{}\n", bus_number))?;
    fs::write(dir.join("devnum"), format!("{}\n", device_number))?;
    fs::write(dir.join("descriptors"), descriptors)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_computes_lengths() {
        let info = TopologyBuilder::new(0x0483, 0x5740)
            .config(1)
            .interface(0, 0, 0x02)
            .endpoint(0x82, ATTR_INTERRUPT, 8)
            .interface(1, 0, 0x0a)
            .endpoint(0x81, ATTR_BULK, 64)
            .endpoint(0x01, ATTR_BULK, 64)
            .build();

        let config = &info.configs[0];
        assert_eq!(info.num_configurations, 1);
        assert_eq!(config.num_interfaces, 2);
        assert_eq!(config.total_length, 9 + 9 + 7 + 9 + 7 + 7);
        assert_eq!(config.interfaces[1].num_endpoints, 2);
        assert_eq!(config.interfaces[0].endpoints[0].interval, 10);
    }

    #[test]
    fn test_extra_counts_toward_total_length() {
        let info = TopologyBuilder::new(0x046d, 0xc03c)
            .config(1)
            .interface(0, 0, 0x03)
            .extra(&[9, 0x21, 0x11, 0x01, 0, 1, 0x22, 52, 0])
            .endpoint(0x81, ATTR_INTERRUPT, 4)
            .build();

        let interface = &info.configs[0].interfaces[0];
        assert_eq!(interface.extra.len(), 9);
        assert!(interface.endpoint_extra.is_empty());
        assert_eq!(info.configs[0].total_length, 9 + 9 + 9 + 7);
    }

    #[test]
    fn test_alternate_settings_share_interface_number() {
        let info = TopologyBuilder::new(0x0d8c, 0x0014)
            .config(1)
            .interface(1, 0, 0x01)
            .interface(1, 1, 0x01)
            .endpoint(0x01, 0x09, 200)
            .build();

        assert_eq!(info.configs[0].num_interfaces, 1);
        assert_eq!(info.configs[0].interfaces.len(), 2);
    }

    #[test]
    fn test_synthetic_topology_shape() {
        let info = synthetic_topology(2, 3, 4);
        assert_eq!(info.configs.len(), 2);
        assert!(info.configs.iter().all(|c| c.interfaces.len() == 3));
        let endpoints = &info.configs[1].interfaces[2].endpoints;
        let addresses: Vec<u8> = endpoints.iter().map(|e| e.address).collect();
        assert_eq!(addresses, vec![0x81, 0x01, 0x82, 0x02]);
    }

    #[test]
    fn test_sample_descriptor_lengths() {
        let bytes = sample_descriptor_bytes();
        assert_eq!(bytes.len(), 18 + 32);
    }

    #[test]
    fn test_write_sysfs_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sysfs_device(dir.path(), "1-1", 1, 4, &[1, 2, 3]).unwrap();

        assert_eq!(fs::read_to_string(path.join("busnum")).unwrap(), "1\n");
        assert_eq!(fs::read_to_string(path.join("devnum")).unwrap(), "4\n");
        assert_eq!(fs::read(path.join("descriptors")).unwrap(), vec![1, 2, 3]);
    }
}
