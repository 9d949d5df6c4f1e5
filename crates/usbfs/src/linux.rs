//! usbfs transport over `/dev/bus/usb/BBB/DDD`

use crate::abi::{BulkTransfer, CtrlTransfer, SetInterface, Urb};
use crate::error::{Error, Result};
use crate::transfer::ControlRequest;
use crate::transport::{Reaped, Transport};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, poll};
use std::ffi::{c_uint, c_void};
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

mod ioctl {
    use crate::abi::{BulkTransfer, CtrlTransfer, SetInterface, Urb};
    use std::ffi::{c_uint, c_void};

    nix::ioctl_readwrite!(control, b'U', 0, CtrlTransfer);
    nix::ioctl_readwrite!(bulk, b'U', 2, BulkTransfer);
    nix::ioctl_read!(set_interface, b'U', 4, SetInterface);
    nix::ioctl_read!(set_configuration, b'U', 5, c_uint);
    nix::ioctl_read!(submit_urb, b'U', 10, Urb);
    nix::ioctl_write_ptr!(reap_urb_ndelay, b'U', 13, *mut c_void);
    nix::ioctl_read!(claim_interface, b'U', 15, c_uint);
    nix::ioctl_read!(release_interface, b'U', 16, c_uint);
    nix::ioctl_none!(reset, b'U', 20);
    nix::ioctl_read!(clear_halt, b'U', 21, c_uint);
}

/// An opened usbfs device node
///
/// The descriptor sits behind a lock: ioctls hold the read side for their
/// duration and [`Transport::close`] takes the write side, so no call can
/// run against a closed or reused descriptor number. A consequence is that
/// close waits for synchronous calls already in flight, including a
/// transfer issued with no timeout that the device never answers.
#[derive(Debug)]
pub struct LinuxTransport {
    fd: RwLock<Option<OwnedFd>>,
    path: PathBuf,
}

impl LinuxTransport {
    /// Open a device node read/write
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| Error::Open {
                path: path.clone(),
                source,
            })?;
        debug!("Opened usbfs node {}", path.display());

        Ok(Self {
            fd: RwLock::new(Some(file.into())),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_fd<R>(&self, f: impl FnOnce(BorrowedFd<'_>) -> io::Result<R>) -> io::Result<R> {
        let guard = self.fd.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(fd) => f(fd.as_fd()),
            None => Err(Errno::EBADF.into()),
        }
    }

    fn uint_ioctl(
        &self,
        value: u32,
        op: unsafe fn(RawFd, *mut c_uint) -> nix::Result<i32>,
    ) -> io::Result<()> {
        self.with_fd(|fd| {
            let mut value: c_uint = value;
            // SAFETY: `value` outlives the call and matches the ioctl's size
            unsafe { op(fd.as_raw_fd(), &mut value) }?;
            Ok(())
        })
    }
}

impl Transport for LinuxTransport {
    unsafe fn submit(&self, urb: NonNull<Urb>) -> io::Result<()> {
        self.with_fd(|fd| {
            // SAFETY: the caller keeps the record and its buffer alive until
            // it is reaped
            unsafe { ioctl::submit_urb(fd.as_raw_fd(), urb.as_ptr()) }?;
            Ok(())
        })
    }

    fn reap(&self, timeout: Duration) -> io::Result<Option<Reaped>> {
        self.with_fd(|fd| {
            let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
            let mut fds = [PollFd::new(fd, PollFlags::POLLOUT | PollFlags::POLLWRNORM)];
            match poll(&mut fds, millis) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            let mut reaped: *mut c_void = ptr::null_mut();
            // SAFETY: the kernel stores one pointer into `reaped`
            let result =
                unsafe { ioctl::reap_urb_ndelay(fd.as_raw_fd(), (&raw mut reaped).cast_const()) };
            match result {
                Ok(_) => {}
                Err(Errno::EAGAIN) | Err(Errno::EINTR) => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            let Some(urb) = NonNull::new(reaped.cast::<Urb>()) else {
                return Ok(None);
            };
            // SAFETY: the kernel only returns records that were submitted and
            // are still owned by the submitter; it no longer writes to them
            let urb = unsafe { urb.as_ref() };
            Ok(Some(Reaped {
                context: urb.context(),
                status: urb.status,
                actual_length: urb.actual_length,
            }))
        })
    }

    fn control(
        &self,
        setup: ControlRequest,
        data: &mut [u8],
        timeout_ms: u32,
    ) -> io::Result<usize> {
        if usize::from(setup.length) > data.len() {
            return Err(Errno::EINVAL.into());
        }
        self.with_fd(|fd| {
            let mut request = CtrlTransfer {
                request_type: setup.request_type,
                request: setup.request,
                value: setup.value,
                index: setup.index,
                length: setup.length,
                timeout: timeout_ms,
                data: data.as_mut_ptr().cast(),
            };
            // SAFETY: `data` holds at least `length` bytes for the call
            let n = unsafe { ioctl::control(fd.as_raw_fd(), &mut request) }?;
            Ok(n as usize)
        })
    }

    fn bulk(
        &self,
        endpoint: u8,
        data: &mut [u8],
        length: u32,
        timeout_ms: u32,
    ) -> io::Result<usize> {
        if length as usize > data.len() {
            return Err(Errno::EINVAL.into());
        }
        self.with_fd(|fd| {
            let mut request = BulkTransfer {
                endpoint: c_uint::from(endpoint),
                length,
                timeout: timeout_ms,
                data: data.as_mut_ptr().cast(),
            };
            // SAFETY: `data` holds at least `length` bytes for the call
            let n = unsafe { ioctl::bulk(fd.as_raw_fd(), &mut request) }?;
            Ok(n as usize)
        })
    }

    fn claim_interface(&self, interface: u32) -> io::Result<()> {
        self.uint_ioctl(interface, ioctl::claim_interface)
    }

    fn release_interface(&self, interface: u32) -> io::Result<()> {
        self.uint_ioctl(interface, ioctl::release_interface)
    }

    fn set_interface(&self, interface: u32, alt_setting: u32) -> io::Result<()> {
        self.with_fd(|fd| {
            let mut request = SetInterface {
                interface,
                alt_setting,
            };
            // SAFETY: plain record passed by pointer for the call only
            unsafe { ioctl::set_interface(fd.as_raw_fd(), &mut request) }?;
            Ok(())
        })
    }

    fn set_configuration(&self, configuration: u32) -> io::Result<()> {
        self.uint_ioctl(configuration, ioctl::set_configuration)
    }

    fn clear_halt(&self, endpoint: u32) -> io::Result<()> {
        self.uint_ioctl(endpoint, ioctl::clear_halt)
    }

    fn reset(&self) -> io::Result<()> {
        self.with_fd(|fd| {
            // SAFETY: argument-less ioctl
            unsafe { ioctl::reset(fd.as_raw_fd()) }?;
            Ok(())
        })
    }

    fn close(&self) {
        let mut guard = self.fd.write().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            debug!("Closed usbfs node {}", self.path.display());
        }
    }
}
