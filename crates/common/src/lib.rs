//! Common utilities for usb-topology
//!
//! Shared error type and logging setup for the workspace binaries.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{LOG_LEVELS, setup_logging, validate_log_level};
