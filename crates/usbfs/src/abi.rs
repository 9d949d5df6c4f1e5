//! usbfs kernel ABI records
//!
//! Fixed-layout structures exchanged with the kernel through the usbfs
//! ioctls (`include/uapi/linux/usbdevice_fs.h`). These are in-process records
//! in native byte order, not a wire format; the ioctl request codes in
//! [`crate::linux`] encode their sizes.

use std::ffi::{c_int, c_uint, c_void};
use std::ptr;

/// URB type tag (`USBDEVFS_URB_TYPE_*`)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrbType {
    Isochronous = 0,
    Interrupt = 1,
    Control = 2,
    Bulk = 3,
}

/// URB flags (`USBDEVFS_URB_*`)
pub mod urb_flags {
    pub const SHORT_NOT_OK: u32 = 0x01;
    pub const ISO_ASAP: u32 = 0x02;
    pub const BULK_CONTINUATION: u32 = 0x04;
    pub const NO_FSBR: u32 = 0x20;
    pub const ZERO_PACKET: u32 = 0x40;
    pub const NO_INTERRUPT: u32 = 0x80;
}

/// `struct usbdevfs_ctrltransfer`
#[repr(C)]
#[derive(Debug)]
pub struct CtrlTransfer {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
    /// Milliseconds, 0 waits forever
    pub timeout: u32,
    pub data: *mut c_void,
}

/// `struct usbdevfs_bulktransfer`
#[repr(C)]
#[derive(Debug)]
pub struct BulkTransfer {
    pub endpoint: c_uint,
    pub length: c_uint,
    /// Milliseconds, 0 waits forever
    pub timeout: c_uint,
    pub data: *mut c_void,
}

/// `struct usbdevfs_setinterface`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetInterface {
    pub interface: c_uint,
    pub alt_setting: c_uint,
}

/// `struct usbdevfs_urb` without the trailing isochronous packet array
///
/// The kernel keeps a pointer to this record from submission until the URB
/// is reaped, and writes `status`, `actual_length` and `error_count` into it
/// on completion.
#[repr(C)]
#[derive(Debug)]
pub struct Urb {
    pub urb_type: u8,
    pub endpoint: u8,
    pub status: c_int,
    pub flags: c_uint,
    pub buffer: *mut c_void,
    pub buffer_length: c_int,
    pub actual_length: c_int,
    pub start_frame: c_int,
    /// Union with `stream_id` in the kernel header
    pub number_of_packets: c_int,
    pub error_count: c_int,
    pub signr: c_uint,
    /// Opaque to the kernel and returned untouched; carries the request's
    /// handle bits
    pub usercontext: *mut c_void,
}

// SAFETY: a `Urb` is plain data. The raw pointers it holds are never
// dereferenced through the record on the Rust side; the buffer they point to
// is owned by the same outstanding-table entry that owns the record.
unsafe impl Send for Urb {}

impl Urb {
    /// Build a fresh request record for `buffer_length` bytes at `buffer`
    pub fn new(urb_type: UrbType, endpoint: u8, buffer: *mut u8, buffer_length: c_int) -> Self {
        Self {
            urb_type: urb_type as u8,
            endpoint,
            status: 0,
            flags: 0,
            buffer: buffer.cast(),
            buffer_length,
            actual_length: 0,
            start_frame: 0,
            number_of_packets: 0,
            error_count: 0,
            signr: 0,
            usercontext: ptr::null_mut(),
        }
    }

    /// Store the request identity in `usercontext`
    pub fn set_context(&mut self, context: usize) {
        self.usercontext = ptr::without_provenance_mut(context);
    }

    pub fn context(&self) -> usize {
        self.usercontext.addr()
    }
}
