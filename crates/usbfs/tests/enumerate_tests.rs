//! Integration tests for sysfs enumeration over a fake device tree

use common::test_utils::{TopologyBuilder, sample_descriptor_bytes, write_sysfs_device};
use std::fs;
use std::path::PathBuf;
use usbfs::{Enumerator, Error};

fn enumerator(root: &tempfile::TempDir) -> Enumerator {
    Enumerator::new(root.path(), "/dev/bus/usb")
}

#[test]
fn test_lists_devices_sorted_by_bus_and_device() {
    let root = tempfile::tempdir().unwrap();
    let hub = TopologyBuilder::new(0x1d6b, 0x0002)
        .config(1)
        .interface(0, 0, 0x09)
        .endpoint(0x81, 3, 4)
        .to_bytes();

    write_sysfs_device(root.path(), "usb2", 2, 1, &hub).unwrap();
    write_sysfs_device(root.path(), "1-1", 1, 4, &sample_descriptor_bytes()).unwrap();
    write_sysfs_device(root.path(), "usb1", 1, 1, &hub).unwrap();

    let devices = enumerator(&root).devices().unwrap();
    let ids: Vec<(u32, u32)> = devices
        .iter()
        .map(|d| (d.bus_number, d.device_number))
        .collect();
    assert_eq!(ids, vec![(1, 1), (1, 4), (2, 1)]);

    let sample = &devices[1];
    assert_eq!(sample.vendor_id, 0x18d1);
    assert_eq!(sample.devfs_path, PathBuf::from("/dev/bus/usb/001/004"));
    assert_eq!(sample.sysfs_path, root.path().join("1-1"));
}

#[test]
fn test_interface_entries_are_skipped() {
    let root = tempfile::tempdir().unwrap();
    write_sysfs_device(root.path(), "1-1", 1, 2, &sample_descriptor_bytes()).unwrap();
    write_sysfs_device(root.path(), "1-1:1.0", 1, 3, &sample_descriptor_bytes()).unwrap();

    let devices = enumerator(&root).devices().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_number, 2);
}

#[test]
fn test_unreadable_or_malformed_devices_are_omitted() {
    let root = tempfile::tempdir().unwrap();
    let mut truncated = sample_descriptor_bytes();
    truncated.truncate(30);

    write_sysfs_device(root.path(), "1-1", 1, 2, &sample_descriptor_bytes()).unwrap();
    write_sysfs_device(root.path(), "1-2", 1, 3, &truncated).unwrap();

    let missing = write_sysfs_device(root.path(), "1-3", 1, 5, &sample_descriptor_bytes()).unwrap();
    fs::remove_file(missing.join("devnum")).unwrap();

    let garbled = write_sysfs_device(root.path(), "1-4", 1, 6, &sample_descriptor_bytes()).unwrap();
    fs::write(garbled.join("busnum"), "bus\n").unwrap();

    let devices = enumerator(&root).devices().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_number, 2);
}

#[test]
fn test_lookups() {
    let root = tempfile::tempdir().unwrap();
    write_sysfs_device(root.path(), "3-2", 3, 7, &sample_descriptor_bytes()).unwrap();
    let enumerator = enumerator(&root);

    let by_id = enumerator.find_vid_pid(0x18d1, 0x4ee7).unwrap();
    assert_eq!((by_id.bus_number, by_id.device_number), (3, 7));

    let by_address = enumerator.find_bus_dev(3, 7).unwrap();
    assert_eq!(by_address, by_id);

    assert!(matches!(enumerator.find_vid_pid(0x0000, 0x0001), Err(Error::NotFound)));
    assert!(matches!(enumerator.find_bus_dev(1, 1), Err(Error::NotFound)));
}

#[test]
fn test_device_list_serializes() {
    let root = tempfile::tempdir().unwrap();
    write_sysfs_device(root.path(), "1-1", 1, 2, &sample_descriptor_bytes()).unwrap();

    let devices = enumerator(&root).devices().unwrap();
    let json = serde_json::to_value(&devices).unwrap();
    assert_eq!(json[0]["bus_number"], 1);
    assert_eq!(json[0]["info"]["descriptor"]["vendor_id"], 0x18d1);
}
