//! Descriptor wire encoding
//!
//! Writes descriptors back into the USB wire format. Every record is emitted
//! with its own `length` field; when that is larger than the standard size the
//! record is padded with zeros so that the declared length stays truthful.
//!
//! Encoding a [`DeviceInfo`] walks the tree in order (device, then each
//! configuration followed by its interfaces and their endpoints), writing
//! each node's preserved raw bytes right after its own record. The
//! configuration's `total_length` is written as stored, so a parsed tree
//! encodes to a block that parses back to an identical tree.

use crate::size;
use crate::types::{
    ConfigDescriptor, ConfigInfo, DeviceDescriptor, DeviceInfo, EndpointDescriptor,
    InterfaceDescriptor, InterfaceInfo,
};
use byteorder::{ByteOrder, LittleEndian};

impl DeviceDescriptor {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut d = [0u8; size::DEVICE];
        d[0] = self.length;
        d[1] = self.descriptor_type;
        LittleEndian::write_u16(&mut d[2..4], self.usb_version);
        d[4] = self.device_class;
        d[5] = self.device_subclass;
        d[6] = self.device_protocol;
        d[7] = self.max_packet_size0;
        LittleEndian::write_u16(&mut d[8..10], self.vendor_id);
        LittleEndian::write_u16(&mut d[10..12], self.product_id);
        LittleEndian::write_u16(&mut d[12..14], self.device_version);
        d[14] = self.manufacturer_index;
        d[15] = self.product_index;
        d[16] = self.serial_number_index;
        d[17] = self.num_configurations;
        padded(&d, self.length)
    }
}

impl ConfigDescriptor {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut d = [0u8; size::CONFIG];
        d[0] = self.length;
        d[1] = self.descriptor_type;
        LittleEndian::write_u16(&mut d[2..4], self.total_length);
        d[4] = self.num_interfaces;
        d[5] = self.configuration_value;
        d[6] = self.configuration_index;
        d[7] = self.attributes;
        d[8] = self.max_power;
        padded(&d, self.length)
    }
}

impl InterfaceDescriptor {
    pub fn to_bytes(&self) -> Vec<u8> {
        let d = [
            self.length,
            self.descriptor_type,
            self.interface_number,
            self.alternate_setting,
            self.num_endpoints,
            self.interface_class,
            self.interface_subclass,
            self.interface_protocol,
            self.interface_index,
        ];
        padded(&d, self.length)
    }
}

impl EndpointDescriptor {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut d = [0u8; size::ENDPOINT];
        d[0] = self.length;
        d[1] = self.descriptor_type;
        d[2] = self.address;
        d[3] = self.attributes;
        LittleEndian::write_u16(&mut d[4..6], self.max_packet_size);
        d[6] = self.interval;
        padded(&d, self.length)
    }
}

impl InterfaceInfo {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.descriptor.to_bytes();
        out.extend_from_slice(&self.extra);
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            out.extend_from_slice(&endpoint.to_bytes());
            if let Some(extra) = self.endpoint_extra.get(index) {
                out.extend_from_slice(extra);
            }
        }
        out
    }

    fn encoded_len(&self) -> usize {
        let endpoints: usize = self
            .endpoints
            .iter()
            .enumerate()
            .map(|(index, e)| {
                record_len(e.length, size::ENDPOINT)
                    + self.endpoint_extra.get(index).map_or(0, Vec::len)
            })
            .sum();
        record_len(self.descriptor.length, size::INTERFACE) + self.extra.len() + endpoints
    }
}

impl ConfigInfo {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.descriptor.to_bytes();
        out.extend_from_slice(&self.extra);
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_bytes());
        }
        out
    }

    /// Number of bytes [`ConfigInfo::to_bytes`] produces, i.e. the value a
    /// consistent `total_length` field would carry
    pub fn encoded_len(&self) -> usize {
        record_len(self.descriptor.length, size::CONFIG)
            + self.extra.len()
            + self
                .interfaces
                .iter()
                .map(InterfaceInfo::encoded_len)
                .sum::<usize>()
    }
}

impl DeviceInfo {
    /// Encode the whole tree as a descriptor block
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.descriptor.to_bytes();
        for config in &self.configs {
            out.extend_from_slice(&config.to_bytes());
        }
        out
    }
}

fn record_len(length: u8, standard: usize) -> usize {
    usize::from(length).max(standard)
}

fn padded(fields: &[u8], length: u8) -> Vec<u8> {
    let mut out = fields.to_vec();
    out.resize(record_len(length, fields.len()), 0);
    out
}
