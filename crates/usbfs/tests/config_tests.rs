//! Integration tests for configuration files

use std::time::Duration;
use usbfs::UsbfsConfig;

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("usbfs.toml");

    let mut config = UsbfsConfig::default();
    config.usb.reap_poll_interval_ms = 20;
    config.logging.log_level = "debug".to_string();
    config.save(&path).unwrap();

    let loaded = UsbfsConfig::load(Some(path)).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.usb.reap_poll_interval(), Duration::from_millis(20));
}

#[test]
fn test_load_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("usbfs.toml");
    std::fs::write(&path, "[logging]\nlog_level = \"chatty\"\n").unwrap();

    let err = UsbfsConfig::load(Some(path)).unwrap_err();
    assert!(err.to_string().contains("Invalid log level"));
}

#[test]
fn test_load_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("usbfs.toml");
    std::fs::write(&path, "[usb\n").unwrap();

    let err = UsbfsConfig::load(Some(path)).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(UsbfsConfig::load(Some(dir.path().join("absent.toml"))).is_err());
}

#[test]
fn test_custom_roots() {
    let config: UsbfsConfig = toml::from_str(
        r#"
        [usb]
        sysfs_root = "/tmp/sys"
        devfs_root = "/tmp/dev"
        "#,
    )
    .unwrap();
    assert_eq!(config.usb.sysfs_root.to_str(), Some("/tmp/sys"));
    assert_eq!(config.usb.reap_poll_interval_ms, 100);
}
