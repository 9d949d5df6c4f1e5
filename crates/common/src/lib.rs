//! Common utilities for usbfs-rs
//!
//! Shared error handling, logging setup and test helpers used by the
//! descriptor parser and the usbfs transfer engine.

pub mod error;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;
