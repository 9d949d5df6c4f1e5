//! Opened device and its asynchronous transfer engine
//!
//! A [`Device`] owns one kernel handle and one reaper thread. Queued
//! transfers are registered in a handle table and submitted to the kernel
//! while the device lock is held; the reaper waits for completions, looks up
//! the handle each completion carries and hands the finished transfer back
//! through its [`Completion`].

use crate::abi::{Urb, UrbType};
use crate::error::{Error, Result, SubmitError};
use crate::handles::{Handle, HandleTable};
use crate::transfer::{Completion, ControlRequest, Transfer, TransferStatus};
use crate::transport::{Reaped, Transport};
use std::ffi::c_int;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// A registered request: the caller's transfer plus the kernel record
/// pointing into it
struct Outstanding {
    transfer: Transfer,
    urb: Box<Urb>,
    done: oneshot::Sender<Transfer>,
}

struct State {
    open: bool,
    outstanding: HandleTable<Outstanding>,
}

struct Shared<T> {
    transport: T,
    state: Mutex<State>,
    stop: AtomicBool,
    reaping: AtomicBool,
}

impl<T: Transport> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, reaped: Reaped) {
        let handle = Handle::from_bits(reaped.context);
        let Some(entry) = self.lock().outstanding.remove(handle) else {
            warn!(
                "Kernel returned completion for unknown request {:#x}, ignoring",
                reaped.context
            );
            return;
        };

        let Outstanding {
            mut transfer,
            urb,
            done,
        } = entry;
        drop(urb);

        transfer.complete(TransferStatus {
            status: reaped.status,
            actual_length: usize::try_from(reaped.actual_length).unwrap_or(0),
        });
        if done.send(transfer).is_err() {
            debug!("Completion for {:?} was dropped before delivery", handle);
        }
    }
}

fn reap_loop<T: Transport>(shared: Arc<Shared<T>>, poll_interval: Duration) {
    info!("Completion reaper started");

    while !shared.stop.load(Ordering::Acquire) {
        match shared.transport.reap(poll_interval) {
            Ok(Some(reaped)) => shared.deliver(reaped),
            Ok(None) => {}
            Err(e) => {
                error!(
                    "Reaping failed, no further completions will be delivered: {}",
                    e
                );
                break;
            }
        }
    }

    shared.reaping.store(false, Ordering::Release);
    info!("Completion reaper stopped");
}

/// An opened USB device
///
/// Dropping the device closes it.
pub struct Device<T: Transport> {
    shared: Arc<Shared<T>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> Device<T> {
    /// Wrap an opened transport and start its reaper thread
    ///
    /// `poll_interval` bounds each reaper wait, and with it how long
    /// [`Device::close`] may block.
    pub fn with_transport(transport: T, poll_interval: Duration) -> Result<Self> {
        let shared = Arc::new(Shared {
            transport,
            state: Mutex::new(State {
                open: true,
                outstanding: HandleTable::new(),
            }),
            stop: AtomicBool::new(false),
            reaping: AtomicBool::new(true),
        });

        let reaper_shared = Arc::clone(&shared);
        let reaper = std::thread::Builder::new()
            .name("usbfs-reaper".to_string())
            .spawn(move || reap_loop(reaper_shared, poll_interval))
            .map_err(Error::Spawn)?;

        Ok(Self {
            shared,
            reaper: Mutex::new(Some(reaper)),
        })
    }

    /// Queue a bulk transfer on `endpoint` (bit 7 set for IN)
    ///
    /// Returns as soon as the kernel accepted the request. On failure the
    /// transfer is handed back inside the error.
    pub fn queue_bulk(
        &self,
        endpoint: u8,
        transfer: Transfer,
    ) -> std::result::Result<Completion, SubmitError> {
        self.queue(UrbType::Bulk, endpoint, transfer)
    }

    pub fn queue_interrupt(
        &self,
        endpoint: u8,
        transfer: Transfer,
    ) -> std::result::Result<Completion, SubmitError> {
        self.queue(UrbType::Interrupt, endpoint, transfer)
    }

    /// Queue a control transfer; the buffer starts with the 8-byte setup
    /// packet followed by the data stage
    pub fn queue_control(
        &self,
        endpoint: u8,
        transfer: Transfer,
    ) -> std::result::Result<Completion, SubmitError> {
        self.queue(UrbType::Control, endpoint, transfer)
    }

    fn queue(
        &self,
        urb_type: UrbType,
        endpoint: u8,
        mut transfer: Transfer,
    ) -> std::result::Result<Completion, SubmitError> {
        if transfer.data.is_empty() {
            return Err(SubmitError::new(
                Error::InvalidArgument("transfer buffer is empty"),
                transfer,
            ));
        }
        let Ok(length) = c_int::try_from(transfer.data.len()) else {
            return Err(SubmitError::new(
                Error::InvalidArgument("transfer buffer is too large"),
                transfer,
            ));
        };

        let mut state = self.shared.lock();
        if !state.open {
            return Err(SubmitError::new(Error::Closed, transfer));
        }
        if !self.shared.reaping.load(Ordering::Acquire) {
            return Err(SubmitError::new(Error::ReaperStopped, transfer));
        }

        let (done, rx) = oneshot::channel();
        let urb = Box::new(Urb::new(
            urb_type,
            endpoint,
            transfer.data.as_mut_ptr(),
            length,
        ));
        let entry = Outstanding {
            transfer,
            urb,
            done,
        };
        let (handle, entry) = match state.outstanding.insert(entry) {
            Ok(inserted) => inserted,
            Err(entry) => {
                return Err(SubmitError::new(
                    Error::TooManyOutstanding,
                    entry.transfer,
                ));
            }
        };
        entry.urb.set_context(handle.to_bits());

        let urb = NonNull::from(entry.urb.as_mut());
        // SAFETY: the record and the transfer buffer are owned by the table
        // entry, which is only removed once the kernel hands the record back
        // or after the transport is closed
        if let Err(e) = unsafe { self.shared.transport.submit(urb) } {
            warn!(
                "Kernel rejected {:?} transfer on endpoint {:#04x}: {}",
                urb_type, endpoint, e
            );
            let Some(rejected) = state.outstanding.remove(handle) else {
                unreachable!("entry {:?} was inserted under the held lock", handle);
            };
            return Err(SubmitError::new(Error::Transport(e), rejected.transfer));
        }

        debug!(
            "Submitted {:?} transfer {:?} on endpoint {:#04x}, {} bytes",
            urb_type, handle, endpoint, length
        );
        Ok(Completion::new(handle, rx))
    }

    /// Synchronous control transfer, returns the number of bytes transferred
    ///
    /// A zero `timeout` waits indefinitely, and [`Device::close`] waits with
    /// it.
    pub fn control(
        &self,
        request: ControlRequest,
        timeout: Duration,
        buffer: &mut [u8],
    ) -> Result<usize> {
        let requested = usize::from(request.length);
        if requested > buffer.len() {
            return Err(Error::InsufficientBuffer {
                requested,
                capacity: buffer.len(),
            });
        }
        self.ensure_open()?;

        self.shared
            .transport
            .control(request, buffer, timeout_ms(timeout))
            .map_err(Error::Transport)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn control_transfer(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
        timeout: Duration,
        buffer: &mut [u8],
    ) -> Result<usize> {
        self.control(
            ControlRequest {
                request_type,
                request,
                value,
                index,
                length,
            },
            timeout,
            buffer,
        )
    }

    /// Synchronous bulk transfer of `length` bytes, returns the number of
    /// bytes transferred
    ///
    /// A zero `timeout` waits indefinitely, as for [`Device::control`].
    pub fn bulk_transfer(
        &self,
        endpoint: u8,
        length: usize,
        timeout: Duration,
        buffer: &mut [u8],
    ) -> Result<usize> {
        if length > buffer.len() {
            return Err(Error::InsufficientBuffer {
                requested: length,
                capacity: buffer.len(),
            });
        }
        let length = u32::try_from(length)
            .map_err(|_| Error::InvalidArgument("bulk length exceeds 32 bits"))?;
        self.ensure_open()?;

        self.shared
            .transport
            .bulk(endpoint, buffer, length, timeout_ms(timeout))
            .map_err(Error::Transport)
    }

    pub fn claim_interface(&self, interface: u32) -> Result<()> {
        self.ensure_open()?;
        self.shared
            .transport
            .claim_interface(interface)
            .map_err(Error::Transport)?;
        debug!("Claimed interface {}", interface);
        Ok(())
    }

    pub fn release_interface(&self, interface: u32) -> Result<()> {
        self.ensure_open()?;
        self.shared
            .transport
            .release_interface(interface)
            .map_err(Error::Transport)
    }

    pub fn set_interface(&self, interface: u32, alt_setting: u32) -> Result<()> {
        self.ensure_open()?;
        self.shared
            .transport
            .set_interface(interface, alt_setting)
            .map_err(Error::Transport)
    }

    pub fn set_configuration(&self, configuration: u32) -> Result<()> {
        self.ensure_open()?;
        self.shared
            .transport
            .set_configuration(configuration)
            .map_err(Error::Transport)
    }

    pub fn clear_halt(&self, endpoint: u8) -> Result<()> {
        self.ensure_open()?;
        self.shared
            .transport
            .clear_halt(u32::from(endpoint))
            .map_err(Error::Transport)
    }

    pub fn reset(&self) -> Result<()> {
        self.ensure_open()?;
        self.shared.transport.reset().map_err(Error::Transport)
    }

    /// Number of transfers queued and not yet completed
    pub fn outstanding(&self) -> usize {
        self.shared.lock().outstanding.len()
    }

    /// Whether completions are still being delivered
    pub fn is_reaping(&self) -> bool {
        self.shared.reaping.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    /// Stop the reaper, release the kernel handle and orphan every transfer
    /// still outstanding
    ///
    /// Waiting [`Completion`]s resolve to [`Error::Orphaned`]. Calling close
    /// again does nothing.
    ///
    /// Close (and therefore `Drop`) blocks until synchronous calls on other
    /// threads return. A [`Device::control`] or [`Device::bulk_transfer`]
    /// issued with a zero timeout against a device that never answers keeps
    /// close waiting; give such calls a timeout if the device may be closed
    /// from another thread.
    pub fn close(&self) {
        {
            let mut state = self.shared.lock();
            if !state.open {
                return;
            }
            state.open = false;
        }

        self.shared.stop.store(true, Ordering::Release);
        let reaper = self
            .reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reaper) = reaper
            && reaper.join().is_err()
        {
            error!("Completion reaper panicked");
        }

        self.shared.transport.close();

        let orphaned = self.shared.lock().outstanding.drain();
        if !orphaned.is_empty() {
            warn!("Closed device with {} outstanding transfers", orphaned.len());
        }
        info!("Device closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.lock().open {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }
}

impl<T: Transport> Drop for Device<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport + std::fmt::Debug> std::fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("transport", &self.shared.transport)
            .field("outstanding", &self.outstanding())
            .field("reaping", &self.is_reaping())
            .finish()
    }
}

fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

#[cfg(target_os = "linux")]
mod linux_open {
    use super::Device;
    use crate::config::UsbSettings;
    use crate::enumerate::DeviceEntry;
    use crate::error::Result;
    use crate::linux::LinuxTransport;
    use std::path::Path;
    use std::time::Duration;
    use tracing::info;

    impl Device<LinuxTransport> {
        /// Open an enumerated device
        pub fn open(entry: &DeviceEntry, settings: &UsbSettings) -> Result<Self> {
            info!(
                "Opening {:04x}:{:04x} at bus {} device {}",
                entry.vendor_id, entry.product_id, entry.bus_number, entry.device_number
            );
            Self::open_path(&entry.devfs_path, settings.reap_poll_interval())
        }

        /// Open a usbfs node directly
        pub fn open_path(path: impl AsRef<Path>, poll_interval: Duration) -> Result<Self> {
            let transport = LinuxTransport::open(path)?;
            Self::with_transport(transport, poll_interval)
        }
    }
}
