//! usb-topology command line support
//!
//! Configuration file handling, VID:PID display filters and tree rendering
//! for the `usb-topology` binary.

pub mod config;
pub mod filter;
pub mod output;
