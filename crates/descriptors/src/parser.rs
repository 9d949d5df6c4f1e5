//! Descriptor block parser
//!
//! The block is a concatenation of `[bLength, bDescriptorType, ...]` records:
//! one device descriptor, then for each configuration a configuration header
//! followed by `wTotalLength - bLength` bytes of interfaces, endpoints and
//! class-specific records.
//!
//! Every record read goes through [`Reader::take`], which checks the minimum
//! size, the declared length against the remaining bytes and the type tag
//! before any field is decoded.

use crate::error::{MalformedDescriptor, Result};
use crate::types::{
    ConfigDescriptor, ConfigInfo, DeviceDescriptor, DeviceInfo, EndpointDescriptor,
    InterfaceDescriptor, InterfaceInfo,
};
use crate::{kind, size};
use byteorder::{ByteOrder, LittleEndian};

/// Parse a raw descriptor block into a device topology
///
/// Fails with [`MalformedDescriptor`] on any structural violation; no partial
/// tree is ever returned. Bytes after the last declared configuration are
/// ignored.
pub fn parse(bytes: &[u8]) -> Result<DeviceInfo> {
    let mut reader = Reader::new(bytes);

    if reader.buf.first().is_some_and(|&len| usize::from(len) != size::DEVICE) {
        return Err(reader.malformed());
    }
    let descriptor = decode_device(reader.take(kind::DEVICE, size::DEVICE)?);

    let configs = (0..descriptor.num_configurations)
        .map(|_| parse_config(&mut reader))
        .collect::<Result<Vec<_>>>()?;

    Ok(DeviceInfo {
        descriptor,
        configs,
    })
}

fn parse_config(reader: &mut Reader<'_>) -> Result<ConfigInfo> {
    reader.skip_nonmatching(kind::CONFIG);
    let header_offset = reader.offset;
    let descriptor = decode_config(reader.take(kind::CONFIG, size::CONFIG)?);

    // wTotalLength covers the header we just consumed
    let body_len = usize::from(descriptor.total_length)
        .checked_sub(usize::from(descriptor.length))
        .ok_or(MalformedDescriptor {
            offset: header_offset,
        })?;
    let mut region = reader.split_region(body_len)?;

    // bNumInterfaces does not count alternate settings, so size the interface
    // list from the records actually present in the region.
    let count = region.count(kind::INTERFACE);

    let mut config = ConfigInfo {
        descriptor,
        interfaces: Vec::with_capacity(count),
        extra: Vec::new(),
    };
    for _ in 0..count {
        let skipped = region.skip_nonmatching(kind::INTERFACE);
        trailing_extra(&mut config).extend_from_slice(skipped);
        config.interfaces.push(parse_interface(&mut region)?);
    }
    trailing_extra(&mut config).extend_from_slice(region.buf);

    for interface in &mut config.interfaces {
        while interface.endpoint_extra.last().is_some_and(Vec::is_empty) {
            interface.endpoint_extra.pop();
        }
    }
    Ok(config)
}

fn parse_interface(region: &mut Reader<'_>) -> Result<InterfaceInfo> {
    let descriptor = decode_interface(region.take(kind::INTERFACE, size::INTERFACE)?);
    let mut interface = InterfaceInfo {
        descriptor,
        endpoints: Vec::with_capacity(usize::from(descriptor.num_endpoints)),
        extra: Vec::new(),
        endpoint_extra: Vec::new(),
    };

    for _ in 0..descriptor.num_endpoints {
        let skipped = region.skip_nonmatching(kind::ENDPOINT);
        interface_trailing_extra(&mut interface).extend_from_slice(skipped);
        let endpoint = region.take(kind::ENDPOINT, size::ENDPOINT)?;
        interface.endpoints.push(decode_endpoint(endpoint));
    }

    Ok(interface)
}

/// Raw-byte slot for whatever follows the last record parsed so far
fn trailing_extra(config: &mut ConfigInfo) -> &mut Vec<u8> {
    match config.interfaces.last_mut() {
        Some(interface) => interface_trailing_extra(interface),
        None => &mut config.extra,
    }
}

fn interface_trailing_extra(interface: &mut InterfaceInfo) -> &mut Vec<u8> {
    let n = interface.endpoints.len();
    if n == 0 {
        return &mut interface.extra;
    }
    if interface.endpoint_extra.len() < n {
        interface.endpoint_extra.resize_with(n, Vec::new);
    }
    &mut interface.endpoint_extra[n - 1]
}

/// Bounds-checked cursor over a descriptor byte range
struct Reader<'a> {
    buf: &'a [u8],
    /// Position of `buf[0]` in the original block
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn malformed(&self) -> MalformedDescriptor {
        MalformedDescriptor {
            offset: self.offset,
        }
    }

    /// Callers guarantee `n <= self.buf.len()`
    fn advance(&mut self, n: usize) {
        self.buf = &self.buf[n..];
        self.offset += n;
    }

    /// Consume one record of type `tag` that is at least `min` bytes long
    ///
    /// Returns the whole record (`bLength` bytes), which may be longer than
    /// `min` when the device appends extra fields.
    fn take(&mut self, tag: u8, min: usize) -> Result<&'a [u8]> {
        let buf = self.buf;
        if buf.len() < min {
            return Err(self.malformed());
        }
        let length = usize::from(buf[0]);
        if length < min || buf.len() < length || buf[1] != tag {
            return Err(self.malformed());
        }
        self.advance(length);
        Ok(&buf[..length])
    }

    /// Step over a single record whose type is not `tag`, returning its bytes
    ///
    /// Only one record is ever skipped. When the next record cannot be read
    /// at all nothing is consumed and the following `take` reports the error.
    fn skip_nonmatching(&mut self, tag: u8) -> &'a [u8] {
        let buf = self.buf;
        if buf.len() < 2 || buf[1] == tag {
            return &[];
        }
        let length = usize::from(buf[0]);
        if length < 2 || buf.len() < length {
            return &[];
        }
        self.advance(length);
        &buf[..length]
    }

    /// Split off the next `len` bytes as an independent reader
    fn split_region(&mut self, len: usize) -> Result<Reader<'a>> {
        if len > self.buf.len() {
            return Err(self.malformed());
        }
        let region = Reader {
            buf: &self.buf[..len],
            offset: self.offset,
        };
        self.advance(len);
        Ok(region)
    }

    /// Count records of type `tag` without consuming anything
    ///
    /// Counting stops at a record that runs past the end of the range or is
    /// shorter than its own two header bytes; whatever follows is left for
    /// the caller as raw bytes.
    fn count(&self, tag: u8) -> usize {
        let mut rest = self.buf;
        let mut count = 0;

        while rest.len() > 1 {
            let length = usize::from(rest[0]);
            if length < 2 || length > rest.len() {
                break;
            }
            if rest[1] == tag {
                count += 1;
            }
            rest = &rest[length..];
        }

        count
    }
}

// Field decoders. Each receives a record already validated by `Reader::take`
// to be at least the standard size for its type.

fn decode_device(d: &[u8]) -> DeviceDescriptor {
    DeviceDescriptor {
        length: d[0],
        descriptor_type: d[1],
        usb_version: LittleEndian::read_u16(&d[2..4]),
        device_class: d[4],
        device_subclass: d[5],
        device_protocol: d[6],
        max_packet_size0: d[7],
        vendor_id: LittleEndian::read_u16(&d[8..10]),
        product_id: LittleEndian::read_u16(&d[10..12]),
        device_version: LittleEndian::read_u16(&d[12..14]),
        manufacturer_index: d[14],
        product_index: d[15],
        serial_number_index: d[16],
        num_configurations: d[17],
    }
}

fn decode_config(d: &[u8]) -> ConfigDescriptor {
    ConfigDescriptor {
        length: d[0],
        descriptor_type: d[1],
        total_length: LittleEndian::read_u16(&d[2..4]),
        num_interfaces: d[4],
        configuration_value: d[5],
        configuration_index: d[6],
        attributes: d[7],
        max_power: d[8],
    }
}

fn decode_interface(d: &[u8]) -> InterfaceDescriptor {
    InterfaceDescriptor {
        length: d[0],
        descriptor_type: d[1],
        interface_number: d[2],
        alternate_setting: d[3],
        num_endpoints: d[4],
        interface_class: d[5],
        interface_subclass: d[6],
        interface_protocol: d[7],
        interface_index: d[8],
    }
}

fn decode_endpoint(d: &[u8]) -> EndpointDescriptor {
    EndpointDescriptor {
        length: d[0],
        descriptor_type: d[1],
        address: d[2],
        attributes: d[3],
        max_packet_size: LittleEndian::read_u16(&d[4..6]),
        interval: d[6],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_NO_CONFIGS: [u8; 18] = [
        18, 1, 0x10, 0x01, 0, 0, 0, 8, 0x34, 0x12, 0x78, 0x56, 0x00, 0x01, 1, 2, 3, 0,
    ];

    fn device_with_configs(n: u8) -> Vec<u8> {
        let mut d = DEVICE_NO_CONFIGS.to_vec();
        d[17] = n;
        d
    }

    #[test]
    fn test_device_only() {
        let info = parse(&DEVICE_NO_CONFIGS).unwrap();
        assert_eq!(info.vendor_id, 0x1234);
        assert_eq!(info.product_id, 0x5678);
        assert_eq!(info.usb_version, 0x0110);
        assert_eq!(info.serial_number_index, 3);
        assert!(info.configs.is_empty());
    }

    #[test]
    fn test_device_length_must_be_exact() {
        let mut d = DEVICE_NO_CONFIGS.to_vec();
        d[0] = 19;
        d.push(0);
        assert!(parse(&d).is_err());

        d[0] = 17;
        assert!(parse(&d).is_err());
    }

    #[test]
    fn test_device_wrong_type() {
        let mut d = DEVICE_NO_CONFIGS.to_vec();
        d[1] = 2;
        assert_eq!(parse(&d), Err(MalformedDescriptor { offset: 0 }));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_config_without_interfaces() {
        let mut d = device_with_configs(1);
        d.extend_from_slice(&[9, 2, 9, 0, 0, 1, 0, 0x80, 50]);

        let info = parse(&d).unwrap();
        assert_eq!(info.configs.len(), 1);
        assert_eq!(info.configs[0].max_power, 50);
        assert!(info.configs[0].interfaces.is_empty());
    }

    #[test]
    fn test_total_length_below_header_size() {
        let mut d = device_with_configs(1);
        d.extend_from_slice(&[9, 2, 8, 0, 0, 1, 0, 0x80, 0]);
        assert_eq!(parse(&d), Err(MalformedDescriptor { offset: 18 }));
    }

    #[test]
    fn test_total_length_past_end_of_buffer() {
        let mut d = device_with_configs(1);
        d.extend_from_slice(&[9, 2, 40, 0, 1, 1, 0, 0x80, 0]);
        d.extend_from_slice(&[9, 4, 0, 0, 0, 0xff, 0, 0, 0]);
        assert!(parse(&d).is_err());
    }

    #[test]
    fn test_skips_one_unknown_record_before_config() {
        let mut d = device_with_configs(1);
        // device qualifier-ish record in the way
        d.extend_from_slice(&[4, 0x0b, 0, 0]);
        d.extend_from_slice(&[9, 2, 9, 0, 0, 1, 0, 0x80, 0]);
        assert_eq!(parse(&d).unwrap().configs.len(), 1);
    }

    #[test]
    fn test_two_unknown_records_exhaust_skip_budget() {
        let mut d = device_with_configs(1);
        d.extend_from_slice(&[4, 0x0b, 0, 0]);
        d.extend_from_slice(&[3, 0x24, 0]);
        d.extend_from_slice(&[9, 2, 9, 0, 0, 1, 0, 0x80, 0]);
        assert_eq!(parse(&d), Err(MalformedDescriptor { offset: 22 }));
    }

    #[test]
    fn test_class_specific_record_between_interface_and_endpoint() {
        let mut d = device_with_configs(1);
        d.extend_from_slice(&[9, 2, 30, 0, 1, 1, 0, 0x80, 0]);
        d.extend_from_slice(&[9, 4, 0, 0, 1, 3, 0, 0, 0]);
        // HID class descriptor
        d.extend_from_slice(&[5, 0x21, 0x11, 0x01, 0]);
        d.extend_from_slice(&[7, 5, 0x81, 3, 8, 0, 10]);

        let info = parse(&d).unwrap();
        let iface = &info.configs[0].interfaces[0];
        assert_eq!(iface.endpoints.len(), 1);
        assert_eq!(iface.endpoints[0].interval, 10);
    }

    #[test]
    fn test_alternate_settings_are_separate_interfaces() {
        let mut d = device_with_configs(1);
        // bNumInterfaces says 1, but two alternate settings are present
        d.extend_from_slice(&[9, 2, 34, 0, 1, 1, 0, 0x80, 0]);
        d.extend_from_slice(&[9, 4, 0, 0, 0, 0xff, 0, 0, 0]);
        d.extend_from_slice(&[9, 4, 0, 1, 1, 0xff, 0, 0, 0]);
        d.extend_from_slice(&[7, 5, 0x02, 2, 0, 2, 0]);

        let info = parse(&d).unwrap();
        let config = &info.configs[0];
        assert_eq!(config.num_interfaces, 1);
        assert_eq!(config.interfaces.len(), 2);
        assert!(config.interfaces[0].endpoints.is_empty());
        assert_eq!(config.interfaces[1].alternate_setting, 1);
        assert_eq!(config.interfaces[1].endpoints[0].max_packet_size, 512);
    }

    #[test]
    fn test_missing_endpoint_fails() {
        let mut d = device_with_configs(1);
        // interface declares two endpoints, only one present
        d.extend_from_slice(&[9, 2, 25, 0, 1, 1, 0, 0x80, 0]);
        d.extend_from_slice(&[9, 4, 0, 0, 2, 0xff, 0, 0, 0]);
        d.extend_from_slice(&[7, 5, 0x81, 2, 0, 2, 0]);
        assert!(parse(&d).is_err());
    }

    #[test]
    fn test_endpoint_cannot_borrow_bytes_past_config_region() {
        let mut d = device_with_configs(2);
        // first config's region ends before its endpoint
        d.extend_from_slice(&[9, 2, 18, 0, 1, 1, 0, 0x80, 0]);
        d.extend_from_slice(&[9, 4, 0, 0, 1, 0xff, 0, 0, 0]);
        d.extend_from_slice(&[7, 5, 0x81, 2, 0, 2, 0]);
        d.extend_from_slice(&[9, 2, 9, 0, 0, 2, 0, 0x80, 0]);
        assert!(parse(&d).is_err());
    }

    #[test]
    fn test_zero_padding_after_children_is_kept() {
        let mut d = device_with_configs(1);
        d.extend_from_slice(&[9, 2, 27, 0, 1, 1, 0, 0x80, 0]);
        d.extend_from_slice(&[9, 4, 0, 0, 1, 0xff, 0, 0, 0]);
        d.extend_from_slice(&[7, 5, 0x81, 2, 0, 2, 0]);
        d.extend_from_slice(&[0, 0]);

        let info = parse(&d).unwrap();
        let iface = &info.configs[0].interfaces[0];
        assert_eq!(iface.endpoints.len(), 1);
        assert_eq!(iface.endpoint_extra, vec![vec![0, 0]]);
        assert_eq!(info.to_bytes(), d);
    }

    #[test]
    fn test_zero_length_record_where_child_expected_fails() {
        let mut d = device_with_configs(1);
        d.extend_from_slice(&[9, 2, 22, 0, 1, 1, 0, 0x80, 0]);
        d.extend_from_slice(&[9, 4, 0, 0, 1, 0xff, 0, 0, 0]);
        d.extend_from_slice(&[0, 0x24, 0, 0]);
        assert_eq!(parse(&d), Err(MalformedDescriptor { offset: 36 }));
    }

    #[test]
    fn test_config_body_without_interfaces_is_kept() {
        let mut d = device_with_configs(1);
        d.extend_from_slice(&[9, 2, 13, 0, 0, 1, 0, 0x80, 0]);
        d.extend_from_slice(&[0, 0x24, 0, 0]);

        let info = parse(&d).unwrap();
        assert_eq!(info.configs[0].extra, vec![0, 0x24, 0, 0]);
    }

    #[test]
    fn test_oversized_records_are_accepted() {
        let mut d = device_with_configs(1);
        d.extend_from_slice(&[9, 2, 27, 0, 1, 1, 0, 0x80, 0]);
        d.extend_from_slice(&[9, 4, 0, 0, 1, 1, 2, 0, 0]);
        // audio endpoint: 9 bytes with bRefresh and bSynchAddress
        d.extend_from_slice(&[9, 5, 0x01, 0x09, 0xc0, 0x00, 1, 0, 0]);

        let info = parse(&d).unwrap();
        let ep = info.configs[0].interfaces[0].endpoints[0];
        assert_eq!(ep.length, 9);
        assert_eq!(ep.max_packet_size, 0xc0);
    }

    #[test]
    fn test_trailing_bytes_after_last_config_ignored() {
        let mut d = device_with_configs(1);
        d.extend_from_slice(&[9, 2, 9, 0, 0, 1, 0, 0x80, 0]);
        d.extend_from_slice(&[0xde, 0xad]);
        assert!(parse(&d).is_ok());
    }
}
