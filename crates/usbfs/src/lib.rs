//! Linux usbfs host access
//!
//! Opens USB devices through the kernel's usbfs nodes and moves data with
//! them. Transfers are either synchronous ([`Device::control_transfer`],
//! [`Device::bulk_transfer`]) or queued ([`Device::queue_bulk`] and friends),
//! in which case a per-device reaper thread delivers each result through the
//! [`Completion`] returned at queue time.
//!
//! # Example
//!
//! ```no_run
//! use usbfs::{Device, Enumerator, Transfer, UsbfsConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = UsbfsConfig::load_or_default();
//! let entry = Enumerator::from_settings(&config.usb).find_vid_pid(0x18d1, 0x4ee7)?;
//!
//! let device = Device::open(&entry, &config.usb)?;
//! device.claim_interface(0)?;
//!
//! let completion = device.queue_bulk(0x81, Transfer::with_len(512))?;
//! let transfer = completion.wait()?;
//! println!("received {} bytes", transfer.received().len());
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod config;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod handles;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod mock;
pub mod transfer;
pub mod transport;

pub use config::{LoggingSettings, UsbSettings, UsbfsConfig};
pub use device::Device;
pub use enumerate::{DeviceEntry, Enumerator};
pub use error::{Error, Result, SubmitError};
pub use handles::Handle;
#[cfg(target_os = "linux")]
pub use linux::LinuxTransport;
pub use transfer::{Completion, ControlRequest, Transfer, TransferStatus};
pub use transport::{Reaped, Transport};
