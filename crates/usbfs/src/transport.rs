//! Kernel transport abstraction
//!
//! [`Device`](crate::Device) drives the usbfs request/response protocol
//! through this trait. [`LinuxTransport`](crate::LinuxTransport) issues the
//! real ioctls; [`MockTransport`](crate::mock::MockTransport) simulates the
//! kernel in-process for tests.

use crate::abi::Urb;
use crate::transfer::ControlRequest;
use std::io;
use std::ptr::NonNull;
use std::time::Duration;

/// One completion returned by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    /// The `usercontext` bits the request was submitted with
    pub context: usize,
    pub status: i32,
    pub actual_length: i32,
}

/// Operations on one opened usbfs device node
///
/// All methods take `&self`: the reaper thread blocks in [`Transport::reap`]
/// while other threads submit or issue synchronous calls.
pub trait Transport: Send + Sync + 'static {
    /// Hand a request record to the kernel
    ///
    /// # Safety
    ///
    /// `urb` and the buffer it points to must stay valid and unmoved until
    /// the record is returned by [`Transport::reap`] or the transport is
    /// closed.
    unsafe fn submit(&self, urb: NonNull<Urb>) -> io::Result<()>;

    /// Wait up to `timeout` for one completion
    ///
    /// `Ok(None)` means nothing completed in time. An error is fatal for the
    /// caller's reap loop.
    fn reap(&self, timeout: Duration) -> io::Result<Option<Reaped>>;

    /// Synchronous control transfer, returns bytes transferred
    ///
    /// Callers guarantee `setup.length as usize <= data.len()`.
    fn control(&self, setup: ControlRequest, data: &mut [u8], timeout_ms: u32)
    -> io::Result<usize>;

    /// Synchronous bulk transfer of `length` bytes, returns bytes transferred
    ///
    /// Callers guarantee `length as usize <= data.len()`.
    fn bulk(&self, endpoint: u8, data: &mut [u8], length: u32, timeout_ms: u32)
    -> io::Result<usize>;

    fn claim_interface(&self, interface: u32) -> io::Result<()>;

    fn release_interface(&self, interface: u32) -> io::Result<()>;

    fn set_interface(&self, interface: u32, alt_setting: u32) -> io::Result<()>;

    fn set_configuration(&self, configuration: u32) -> io::Result<()>;

    fn clear_halt(&self, endpoint: u32) -> io::Result<()>;

    fn reset(&self) -> io::Result<()>;

    /// Release the device node; later calls fail
    ///
    /// Implementations may wait for synchronous calls still running.
    fn close(&self);
}
