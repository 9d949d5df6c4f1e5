//! In-process kernel simulation
//!
//! [`MockTransport`] accepts submissions like the kernel would and lets a
//! test decide when, in what order and with what result each one completes.
//! It also records synchronous calls so tests can assert that a request was
//! rejected before reaching the kernel.

use crate::abi::Urb;
use crate::transfer::ControlRequest;
use crate::transport::{Reaped, Transport};
use std::collections::VecDeque;
use std::io;
use std::ptr::{self, NonNull};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const EBADF: i32 = 9;

/// A request the mock kernel currently holds
#[derive(Debug, Clone)]
pub struct Submission {
    pub context: usize,
    pub urb_type: u8,
    pub endpoint: u8,
    pub buffer_length: usize,
    /// Buffer contents at submit time
    pub payload: Vec<u8>,
    urb: NonNull<Urb>,
}

// SAFETY: the record pointer is only dereferenced while the submission is
// pending, which the submitter guarantees keeps the record alive.
unsafe impl Send for Submission {}

/// Synchronous operations seen by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    Control(ControlRequest),
    Bulk { endpoint: u8, length: u32 },
    ClaimInterface(u32),
    ReleaseInterface(u32),
    SetInterface(u32, u32),
    SetConfiguration(u32),
    ClearHalt(u32),
    Reset,
}

#[derive(Debug, Default)]
struct MockState {
    pending: Vec<Submission>,
    completions: VecDeque<Reaped>,
    reap_error: Option<i32>,
    reject_submit: Option<i32>,
    fail_call: Option<i32>,
    ops: Vec<MockOp>,
    sync_response: Vec<u8>,
    submitted: usize,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    ready: Condvar,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests submitted and not yet completed, in submit order
    pub fn pending(&self) -> Vec<Submission> {
        self.lock().pending.clone()
    }

    /// Total number of accepted submissions
    pub fn submitted(&self) -> usize {
        self.lock().submitted
    }

    /// Complete a pending request without touching its buffer
    ///
    /// Returns false if no pending request carries `context`.
    pub fn complete(&self, context: usize, status: i32, actual_length: usize) -> bool {
        self.finish(context, status, actual_length, &[])
    }

    /// Complete a pending IN request, writing `data` into its buffer first
    ///
    /// `data` is truncated to the request's buffer length.
    pub fn complete_with_data(&self, context: usize, status: i32, data: &[u8]) -> bool {
        self.finish(context, status, data.len(), data)
    }

    fn finish(&self, context: usize, status: i32, actual_length: usize, data: &[u8]) -> bool {
        let mut state = self.lock();
        let Some(pos) = state.pending.iter().position(|s| s.context == context) else {
            return false;
        };
        let submission = state.pending.remove(pos);
        let written = data.len().min(submission.buffer_length);
        let actual_length = actual_length.min(submission.buffer_length) as i32;

        // SAFETY: a pending record and its buffer stay alive until reaped
        unsafe {
            let urb = submission.urb.as_ptr();
            if written > 0 {
                ptr::copy_nonoverlapping(data.as_ptr(), (*urb).buffer.cast::<u8>(), written);
            }
            (*urb).status = status;
            (*urb).actual_length = actual_length;
        }

        state.completions.push_back(Reaped {
            context,
            status,
            actual_length,
        });
        self.ready.notify_all();
        true
    }

    /// Queue a completion whose context matches no submission
    pub fn complete_unknown(&self, context: usize) {
        self.lock().completions.push_back(Reaped {
            context,
            status: 0,
            actual_length: 0,
        });
        self.ready.notify_all();
    }

    /// Make every following reap fail with `errno`
    pub fn fail_reaping(&self, errno: i32) {
        self.lock().reap_error = Some(errno);
        self.ready.notify_all();
    }

    /// Reject the next submission with `errno`
    pub fn reject_next_submit(&self, errno: i32) {
        self.lock().reject_submit = Some(errno);
    }

    /// Fail the next synchronous call or interface operation with `errno`
    pub fn fail_next_call(&self, errno: i32) {
        self.lock().fail_call = Some(errno);
    }

    /// Bytes returned by IN control and bulk calls
    pub fn set_sync_response(&self, data: Vec<u8>) {
        self.lock().sync_response = data;
    }

    pub fn operations(&self) -> Vec<MockOp> {
        self.lock().ops.clone()
    }

    /// Number of control and bulk calls that reached the mock
    pub fn sync_calls(&self) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| matches!(op, MockOp::Control(_) | MockOp::Bulk { .. }))
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn record(&self, op: MockOp) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::Error::from_raw_os_error(EBADF));
        }
        state.ops.push(op);
        match state.fail_call.take() {
            Some(errno) => Err(io::Error::from_raw_os_error(errno)),
            None => Ok(()),
        }
    }

    fn respond(&self, is_in: bool, data: &mut [u8], length: usize) -> usize {
        if !is_in {
            return length;
        }
        let state = self.lock();
        let n = state.sync_response.len().min(length);
        data[..n].copy_from_slice(&state.sync_response[..n]);
        n
    }
}

impl Transport for MockTransport {
    unsafe fn submit(&self, urb: NonNull<Urb>) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(io::Error::from_raw_os_error(EBADF));
        }
        if let Some(errno) = state.reject_submit.take() {
            return Err(io::Error::from_raw_os_error(errno));
        }

        // SAFETY: the caller guarantees the record and buffer are valid
        let (record, payload) = unsafe {
            let record = urb.as_ref();
            let len = usize::try_from(record.buffer_length).unwrap_or(0);
            let payload = std::slice::from_raw_parts(record.buffer.cast::<u8>(), len).to_vec();
            (record, payload)
        };
        state.pending.push(Submission {
            context: record.context(),
            urb_type: record.urb_type,
            endpoint: record.endpoint,
            buffer_length: payload.len(),
            payload,
            urb,
        });
        state.submitted += 1;
        Ok(())
    }

    fn reap(&self, timeout: Duration) -> io::Result<Option<Reaped>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(errno) = state.reap_error {
                return Err(io::Error::from_raw_os_error(errno));
            }
            if let Some(reaped) = state.completions.pop_front() {
                return Ok(Some(reaped));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn control(
        &self,
        setup: ControlRequest,
        data: &mut [u8],
        _timeout_ms: u32,
    ) -> io::Result<usize> {
        self.record(MockOp::Control(setup))?;
        let length = usize::from(setup.length).min(data.len());
        Ok(self.respond(setup.is_in(), data, length))
    }

    fn bulk(
        &self,
        endpoint: u8,
        data: &mut [u8],
        length: u32,
        _timeout_ms: u32,
    ) -> io::Result<usize> {
        self.record(MockOp::Bulk { endpoint, length })?;
        let length = (length as usize).min(data.len());
        Ok(self.respond(endpoint & 0x80 != 0, data, length))
    }

    fn claim_interface(&self, interface: u32) -> io::Result<()> {
        self.record(MockOp::ClaimInterface(interface))
    }

    fn release_interface(&self, interface: u32) -> io::Result<()> {
        self.record(MockOp::ReleaseInterface(interface))
    }

    fn set_interface(&self, interface: u32, alt_setting: u32) -> io::Result<()> {
        self.record(MockOp::SetInterface(interface, alt_setting))
    }

    fn set_configuration(&self, configuration: u32) -> io::Result<()> {
        self.record(MockOp::SetConfiguration(configuration))
    }

    fn clear_halt(&self, endpoint: u32) -> io::Result<()> {
        self.record(MockOp::ClearHalt(endpoint))
    }

    fn reset(&self) -> io::Result<()> {
        self.record(MockOp::Reset)
    }

    fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        // Pending records are about to be freed by their owner
        state.pending.clear();
        state.completions.clear();
        self.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::UrbType;

    #[test]
    fn test_submit_then_complete_writes_buffer() {
        let mock = MockTransport::new();
        let mut buffer = vec![0u8; 4];
        let mut urb = Box::new(Urb::new(UrbType::Bulk, 0x81, buffer.as_mut_ptr(), 4));
        urb.set_context(42);

        unsafe { mock.submit(NonNull::from(urb.as_mut())) }.unwrap();
        assert_eq!(mock.pending()[0].endpoint, 0x81);

        assert!(mock.complete_with_data(42, 0, &[1, 2, 3, 4, 5]));
        let reaped = mock.reap(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(reaped.context, 42);
        assert_eq!(reaped.actual_length, 4);
        assert_eq!(urb.actual_length, 4);
        assert_eq!(buffer, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_reap_times_out_empty() {
        let mock = MockTransport::new();
        assert_eq!(mock.reap(Duration::from_millis(5)).unwrap(), None);
    }

    #[test]
    fn test_reap_error_is_sticky() {
        let mock = MockTransport::new();
        mock.fail_reaping(19);
        for _ in 0..2 {
            let err = mock.reap(Duration::from_millis(1)).unwrap_err();
            assert_eq!(err.raw_os_error(), Some(19));
        }
    }

    #[test]
    fn test_complete_unknown_context() {
        let mock = MockTransport::new();
        assert!(!mock.complete(7, 0, 0));
        mock.complete_unknown(7);
        assert_eq!(mock.reap(Duration::ZERO).unwrap().map(|r| r.context), Some(7));
    }

    #[test]
    fn test_fail_next_call_applies_once() {
        let mock = MockTransport::new();
        mock.fail_next_call(16);
        assert_eq!(mock.claim_interface(0).unwrap_err().raw_os_error(), Some(16));
        assert!(mock.claim_interface(0).is_ok());
        assert_eq!(mock.operations().len(), 2);
    }
}
