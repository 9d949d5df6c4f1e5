//! Configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbfsConfig {
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where devices are discovered and how completions are reaped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Directory holding one entry per USB device
    #[serde(default = "UsbSettings::default_sysfs_root")]
    pub sysfs_root: PathBuf,
    /// Root of the usbfs device nodes (`<root>/BBB/DDD`)
    #[serde(default = "UsbSettings::default_devfs_root")]
    pub devfs_root: PathBuf,
    /// Upper bound on one reaper wait; also bounds how long close() waits
    /// for the reaper to notice the stop request
    #[serde(default = "UsbSettings::default_reap_poll_interval_ms")]
    pub reap_poll_interval_ms: u64,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            sysfs_root: Self::default_sysfs_root(),
            devfs_root: Self::default_devfs_root(),
            reap_poll_interval_ms: Self::default_reap_poll_interval_ms(),
        }
    }
}

impl UsbSettings {
    fn default_sysfs_root() -> PathBuf {
        PathBuf::from("/sys/bus/usb/devices")
    }

    fn default_devfs_root() -> PathBuf {
        PathBuf::from("/dev/bus/usb")
    }

    fn default_reap_poll_interval_ms() -> u64 {
        100
    }

    pub fn reap_poll_interval(&self) -> Duration {
        Duration::from_millis(self.reap_poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "LoggingSettings::default_log_level")]
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl LoggingSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl UsbfsConfig {
    /// Load configuration from the specified path, or the first existing
    /// standard location
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usbfs-rs/usbfs.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: UsbfsConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbfs-rs").join("usbfs.toml")
        } else {
            PathBuf::from(".config/usbfs-rs/usbfs.toml")
        }
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.log_level,
                valid_levels.join(", ")
            ));
        }

        if !(1..=60_000).contains(&self.usb.reap_poll_interval_ms) {
            return Err(anyhow!(
                "Invalid reap_poll_interval_ms {}, must be between 1 and 60000",
                self.usb.reap_poll_interval_ms
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UsbfsConfig::default();
        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.usb.sysfs_root, PathBuf::from("/sys/bus/usb/devices"));
        assert_eq!(config.usb.reap_poll_interval(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: UsbfsConfig = toml::from_str("[usb]\nreap_poll_interval_ms = 25\n").unwrap();
        assert_eq!(config.usb.reap_poll_interval_ms, 25);
        assert_eq!(config.usb.devfs_root, PathBuf::from("/dev/bus/usb"));
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn test_validate_poll_interval() {
        let mut config = UsbfsConfig::default();
        config.usb.reap_poll_interval_ms = 0;
        assert!(config.validate().is_err());

        config.usb.reap_poll_interval_ms = 60_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = UsbfsConfig::default();
        config.logging.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.log_level = "trace".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = UsbfsConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: UsbfsConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }
}
