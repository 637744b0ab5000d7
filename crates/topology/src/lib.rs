//! Live USB device topology
//!
//! This crate keeps a tree of the USB devices attached to the host, wired up
//! the way they are plugged into hubs. The tree is refreshed by polling: every
//! scan pass takes a fresh enumeration snapshot from libusb and reconciles it
//! against the devices already known.
//!
//! - [`DeviceIdentity`] names one physical device attachment and is the key
//!   of the device registry.
//! - [`UsbEnumerator`] and [`NativeDevice`] are the boundary to the native
//!   library; [`RusbEnumerator`] implements them on top of `rusb`.
//! - [`TopologyScanner`] runs the reconciliation passes.
//! - [`DeviceManager`] ties everything together and optionally scans in a
//!   background thread.
//!
//! # Example
//!
//! ```no_run
//! use topology::{DeviceManager, ScannerConfig};
//!
//! # fn main() -> topology::Result<()> {
//! let manager = DeviceManager::open(ScannerConfig::default())?;
//! manager.scan()?;
//! for device in manager.devices() {
//!     println!("{}", device.identity);
//! }
//! manager.start()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod manager;
pub mod native;
pub mod node;
pub mod ports;
pub mod registry;
pub mod scanner;
pub mod speed;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod worker;

pub use config::{DEFAULT_SCAN_INTERVAL, DEFAULT_SCAN_INTERVAL_MS, ScannerConfig};
pub use error::{Result, TopologyError};
pub use events::TopologyEvent;
pub use identity::{DescriptorFingerprint, DeviceIdentity, HUB_CLASS};
pub use manager::DeviceManager;
pub use native::{NativeDevice, RusbEnumerator, UsbEnumerator};
pub use node::{DeviceNode, NodeInfo, NodeKind};
pub use ports::PortSet;
pub use registry::{Registry, TreeNode};
pub use scanner::{ScanSummary, TopologyScanner};
pub use speed::DeviceSpeed;
pub use worker::{ScanLoop, spawn_scan_loop};
