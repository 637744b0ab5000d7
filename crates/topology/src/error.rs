//! Topology error types

use crate::identity::DeviceIdentity;
use thiserror::Error;

/// Errors raised by the device scanner and manager
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The native USB context could not be created; the manager is unusable
    #[error("Unable to initialize libusb: {0}")]
    Initialization(#[source] rusb::Error),

    /// The native device listing failed; the scan pass was aborted
    #[error("Unable to get USB device list: {0}")]
    Enumeration(#[source] rusb::Error),

    /// The device descriptor of a single device could not be read
    #[error("Unable to get device descriptor for device {address} at bus {bus}: {source}")]
    DescriptorRead {
        bus: u8,
        address: u8,
        #[source]
        source: rusb::Error,
    },

    /// No device with this identity is currently registered
    #[error("USB device not found: {0}")]
    DeviceNotFound(DeviceIdentity),

    /// The device exists but has no ports to scan
    #[error("USB device is not a hub: {0}")]
    NotAHub(DeviceIdentity),

    /// The background scanner thread could not be spawned
    #[error("Failed to spawn scanner thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Type alias for topology results
pub type Result<T> = std::result::Result<T, TopologyError>;
