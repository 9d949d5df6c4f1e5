//! Device discovery through sysfs
//!
//! Every USB device has a directory under the sysfs root holding its bus
//! number, device number and raw descriptor block. Interface directories
//! (names containing `:`) are skipped. A device is listed only if all three
//! files can be read and its descriptors parse.

use crate::config::UsbSettings;
use crate::error::{Error, Result};
use descriptors::DeviceInfo;
use serde::Serialize;
use std::fs;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One discovered device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    pub bus_number: u32,
    pub device_number: u32,
    pub info: DeviceInfo,
    pub sysfs_path: PathBuf,
    /// usbfs node to open for transfers
    pub devfs_path: PathBuf,
}

impl Deref for DeviceEntry {
    type Target = DeviceInfo;

    fn deref(&self) -> &DeviceInfo {
        &self.info
    }
}

#[derive(Debug, Clone)]
pub struct Enumerator {
    sysfs_root: PathBuf,
    devfs_root: PathBuf,
}

impl Default for Enumerator {
    fn default() -> Self {
        Self::from_settings(&UsbSettings::default())
    }
}

impl Enumerator {
    pub fn new(sysfs_root: impl Into<PathBuf>, devfs_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            devfs_root: devfs_root.into(),
        }
    }

    pub fn from_settings(settings: &UsbSettings) -> Self {
        Self::new(&settings.sysfs_root, &settings.devfs_root)
    }

    /// usbfs node path for a bus/device pair
    pub fn devfs_path(&self, bus_number: u32, device_number: u32) -> PathBuf {
        self.devfs_root
            .join(format!("{:03}", bus_number))
            .join(format!("{:03}", device_number))
    }

    /// List every readable device, sorted by bus then device number
    ///
    /// Only a failure to list the sysfs root itself is an error.
    pub fn devices(&self) -> Result<Vec<DeviceEntry>> {
        let sysfs_err = |source| Error::Sysfs {
            path: self.sysfs_root.clone(),
            source,
        };

        let mut devices = Vec::new();
        for dirent in fs::read_dir(&self.sysfs_root).map_err(sysfs_err)? {
            let dirent = dirent.map_err(sysfs_err)?;
            let name = dirent.file_name();
            if name.to_string_lossy().contains(':') {
                continue;
            }

            let path = dirent.path();
            match self.read_device(&path) {
                Ok(entry) => devices.push(entry),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        devices.sort_by_key(|d| (d.bus_number, d.device_number));
        debug!("Enumerated {} USB devices", devices.len());
        Ok(devices)
    }

    /// First device with the given vendor and product id
    pub fn find_vid_pid(&self, vendor_id: u16, product_id: u16) -> Result<DeviceEntry> {
        self.devices()?
            .into_iter()
            .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
            .ok_or(Error::NotFound)
    }

    pub fn find_bus_dev(&self, bus_number: u32, device_number: u32) -> Result<DeviceEntry> {
        self.devices()?
            .into_iter()
            .find(|d| d.bus_number == bus_number && d.device_number == device_number)
            .ok_or(Error::NotFound)
    }

    fn read_device(&self, dir: &Path) -> Result<DeviceEntry> {
        let bus_number = read_number(&dir.join("busnum"))?;
        let device_number = read_number(&dir.join("devnum"))?;

        let descriptors_path = dir.join("descriptors");
        let bytes = fs::read(&descriptors_path).map_err(|source| Error::Sysfs {
            path: descriptors_path,
            source,
        })?;
        let info = descriptors::parse(&bytes)?;

        Ok(DeviceEntry {
            bus_number,
            device_number,
            info,
            sysfs_path: dir.to_path_buf(),
            devfs_path: self.devfs_path(bus_number, device_number),
        })
    }
}

fn read_number(path: &Path) -> Result<u32> {
    let text = fs::read_to_string(path).map_err(|source| Error::Sysfs {
        path: path.to_path_buf(),
        source,
    })?;
    parse_leading_decimal(&text).ok_or_else(|| Error::Sysfs {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidData, "expected a decimal number"),
    })
}

/// Value of the leading decimal digits, `None` if there are none
fn parse_leading_decimal(text: &str) -> Option<u32> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text[..end].parse().ok()
}
