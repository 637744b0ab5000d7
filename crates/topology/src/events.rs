//! Topology change notifications

use crate::identity::DeviceIdentity;
use crate::node::NodeInfo;
use serde::Serialize;

/// Change to the device tree produced by a scan pass
///
/// Within one pass, detaches come first (deepest devices first), followed by
/// attaches (hubs before the devices below them).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TopologyEvent {
    /// A device was attached to a hub port
    DeviceAttached {
        /// Hub the device was attached to, `None` for the root hub
        hub: Option<DeviceIdentity>,
        port: u8,
        device: NodeInfo,
    },

    /// A device was detached from a hub port
    DeviceDetached {
        /// Hub the device was detached from, `None` for the root hub
        hub: Option<DeviceIdentity>,
        port: u8,
        identity: DeviceIdentity,
    },
}

impl TopologyEvent {
    /// Identity of the device the event is about
    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            TopologyEvent::DeviceAttached { device, .. } => &device.identity,
            TopologyEvent::DeviceDetached { identity, .. } => identity,
        }
    }

    pub fn is_attach(&self) -> bool {
        matches!(self, TopologyEvent::DeviceAttached { .. })
    }
}
