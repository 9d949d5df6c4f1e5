//! usbfs error types

use crate::transfer::Transfer;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the transfer engine, transports and enumeration
#[derive(Debug, Error)]
pub enum Error {
    /// Caller passed an unusable argument, e.g. an empty transfer buffer
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Requested transfer length exceeds the supplied buffer
    #[error("Insufficient buffer: requested {requested} bytes, buffer holds {capacity}")]
    InsufficientBuffer { requested: usize, capacity: usize },

    /// The kernel rejected a submit, reap, claim or synchronous transfer;
    /// the OS error is preserved as reported
    #[error("Kernel transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read sysfs entry {}: {source}", path.display())]
    Sysfs {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Descriptor(#[from] descriptors::MalformedDescriptor),

    #[error("Failed to start reaper thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("No matching USB device found")]
    NotFound,

    #[error("Device is closed")]
    Closed,

    /// The completion reaper hit a fatal transport error; asynchronous
    /// requests can no longer complete on this device
    #[error("Completion reaper has stopped")]
    ReaperStopped,

    #[error("Too many outstanding transfers")]
    TooManyOutstanding,

    /// The device was closed while the transfer was still outstanding
    #[error("Transfer was orphaned before completing")]
    Orphaned,
}

impl Error {
    /// Raw OS error code for transport failures
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Transport(e) | Error::Open { source: e, .. } => e.raw_os_error(),
            _ => None,
        }
    }
}

/// A queue request that was not accepted
///
/// Carries the transfer back to the caller so its buffer is not lost.
#[derive(Debug, Error)]
#[error("Transfer not submitted")]
pub struct SubmitError {
    #[source]
    pub error: Error,
    pub transfer: Transfer,
}

impl SubmitError {
    pub(crate) fn new(error: Error, transfer: Transfer) -> Self {
        Self { error, transfer }
    }

    pub fn into_parts(self) -> (Error, Transfer) {
        (self.error, self.transfer)
    }
}

impl From<SubmitError> for Error {
    fn from(err: SubmitError) -> Self {
        err.error
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InsufficientBuffer {
            requested: 64,
            capacity: 8,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("64"));
        assert!(msg.contains("8"));
    }

    #[test]
    fn test_transport_error_keeps_errno() {
        let err = Error::Transport(io::Error::from_raw_os_error(19));
        assert_eq!(err.raw_os_error(), Some(19));
        assert_eq!(Error::Closed.raw_os_error(), None);
    }

    #[test]
    fn test_submit_error_converts() {
        let submit = SubmitError::new(Error::InvalidArgument("empty"), Transfer::new(Vec::new()));
        let err: Error = submit.into();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
