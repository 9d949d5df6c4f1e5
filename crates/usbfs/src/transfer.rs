//! Transfer records and completion handles

use crate::error::{Error, Result};
use crate::handles::Handle;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// USB setup packet fields for a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    /// bmRequestType; bit 7 set means device-to-host
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl ControlRequest {
    pub fn is_in(&self) -> bool {
        self.request_type & 0x80 != 0
    }
}

/// Result the kernel reported for a completed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStatus {
    /// 0 on success, otherwise a negative errno (e.g. `-EPIPE` for a stall)
    pub status: i32,
    /// Bytes actually transferred
    pub actual_length: usize,
}

impl TransferStatus {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// The failure as an OS error, `None` on success
    pub fn error(&self) -> Option<io::Error> {
        (self.status != 0).then(|| io::Error::from_raw_os_error(self.status.saturating_neg()))
    }
}

/// Caller-owned request/result record for asynchronous transfers
///
/// For OUT transfers the buffer holds the data to send; for IN transfers its
/// length is the number of bytes to request. Queueing a transfer moves it into
/// the device until the kernel completes it, so the buffer cannot move or be
/// freed while the kernel may write to it.
#[derive(Debug)]
pub struct Transfer {
    pub(crate) data: Vec<u8>,
    pub(crate) result: Option<TransferStatus>,
}

impl Transfer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, result: None }
    }

    /// Zeroed receive buffer of `len` bytes
    pub fn with_len(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes the kernel reported as transferred, empty until completed
    pub fn received(&self) -> &[u8] {
        let len = self
            .result
            .map_or(0, |r| r.actual_length.min(self.data.len()));
        &self.data[..len]
    }

    pub fn result(&self) -> Option<TransferStatus> {
        self.result
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn complete(&mut self, status: TransferStatus) {
        self.result = Some(status);
    }
}

/// Pending result of a queued transfer
///
/// Resolves exactly once with the completed [`Transfer`], or with
/// [`Error::Orphaned`] if the device was closed first. Can be awaited or
/// waited on from a plain thread.
#[derive(Debug)]
pub struct Completion {
    handle: Handle,
    rx: oneshot::Receiver<Transfer>,
}

impl Completion {
    pub(crate) fn new(handle: Handle, rx: oneshot::Receiver<Transfer>) -> Self {
        Self { handle, rx }
    }

    /// Handle the request was registered under
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Block the current thread until the transfer completes
    ///
    /// Must not be called from within an async runtime; `.await` the
    /// completion there instead.
    pub fn wait(self) -> Result<Transfer> {
        self.rx.blocking_recv().map_err(|_| Error::Orphaned)
    }

    /// Non-blocking check, `None` while still outstanding
    pub fn try_wait(&mut self) -> Option<Result<Transfer>> {
        match self.rx.try_recv() {
            Ok(transfer) => Some(Ok(transfer)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::Orphaned)),
        }
    }
}

impl Future for Completion {
    type Output = Result<Transfer>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| Error::Orphaned))
    }
}
