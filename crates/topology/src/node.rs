//! Device nodes
//!
//! Every registered device is a [`DeviceNode`]: either a hub with its own
//! [`PortSet`] or a leaf device. The node owns one reference on the native
//! device for as long as it stays in the registry.

use crate::identity::DeviceIdentity;
use crate::native::NativeDevice;
use crate::ports::PortSet;
use crate::speed::DeviceSpeed;
use serde::Serialize;

/// Hub or leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Hub with downstream ports
    Hub { ports: PortSet },
    /// Any other device
    Leaf,
}

/// A registered USB device
#[derive(Debug)]
pub struct DeviceNode<H> {
    identity: DeviceIdentity,
    parent: Option<DeviceIdentity>,
    speed: DeviceSpeed,
    handle: H,
    kind: NodeKind,
}

impl<H: NativeDevice> DeviceNode<H> {
    /// Create a node, taking over the given native reference
    ///
    /// The node kind follows the device class of the identity.
    pub fn new(
        identity: DeviceIdentity,
        parent: Option<DeviceIdentity>,
        speed: DeviceSpeed,
        handle: H,
    ) -> Self {
        let kind = if identity.is_hub() {
            NodeKind::Hub {
                ports: PortSet::new(),
            }
        } else {
            NodeKind::Leaf
        };

        Self {
            identity,
            parent,
            speed,
            handle,
            kind,
        }
    }

    /// Get a new reference on the native device
    pub fn acquire_handle(&self) -> H {
        self.handle.clone()
    }
}

impl<H> DeviceNode<H> {
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Identity of the parent hub as reported at creation time
    ///
    /// `None` means the device hangs off the virtual root hub.
    pub fn parent(&self) -> Option<&DeviceIdentity> {
        self.parent.as_ref()
    }

    pub fn speed(&self) -> DeviceSpeed {
        self.speed
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_hub(&self) -> bool {
        matches!(self.kind, NodeKind::Hub { .. })
    }

    /// Downstream ports, `None` for leaf devices
    pub fn ports(&self) -> Option<&PortSet> {
        match &self.kind {
            NodeKind::Hub { ports } => Some(ports),
            NodeKind::Leaf => None,
        }
    }

    pub fn ports_mut(&mut self) -> Option<&mut PortSet> {
        match &mut self.kind {
            NodeKind::Hub { ports } => Some(ports),
            NodeKind::Leaf => None,
        }
    }

    /// Handle-free view of this node
    pub fn info(&self, port: Option<u8>) -> NodeInfo {
        NodeInfo {
            identity: self.identity,
            parent: self.parent,
            speed: self.speed,
            is_hub: self.is_hub(),
            port,
        }
    }
}

/// Snapshot of a node handed out to readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub identity: DeviceIdentity,
    pub parent: Option<DeviceIdentity>,
    pub speed: DeviceSpeed,
    pub is_hub: bool,
    /// Port on the hub the node is attached to, if attached
    pub port: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockBus, MockDevice};

    #[test]
    fn test_kind_follows_device_class() {
        let bus = MockBus::new();
        let hub = MockDevice::hub(1, 2, 1);
        let leaf = MockDevice::leaf(1, 3, 1, 0x046d, 0xc52b);
        bus.plug(hub.clone());
        bus.plug(leaf.clone());

        let hub_id = hub.identity();
        let node = DeviceNode::new(hub_id, None, DeviceSpeed::High, bus.handle_for(&hub));
        assert!(node.is_hub());
        assert!(node.ports().is_some());

        let leaf_id = leaf.identity();
        let node = DeviceNode::new(leaf_id, Some(hub_id), DeviceSpeed::Full, bus.handle_for(&leaf));
        assert!(!node.is_hub());
        assert!(node.ports().is_none());
        assert_eq!(node.parent(), Some(&hub_id));
    }

    #[test]
    fn test_handle_released_on_drop() {
        let bus = MockBus::new();
        let leaf = MockDevice::leaf(1, 3, 1, 0x046d, 0xc52b);
        bus.plug(leaf.clone());
        let refs = bus.refs();

        let node = DeviceNode::new(leaf.identity(), None, DeviceSpeed::Full, bus.handle_for(&leaf));
        assert_eq!(refs.outstanding(), 1);

        let extra = node.acquire_handle();
        assert_eq!(refs.outstanding(), 2);
        drop(extra);
        drop(node);
        assert_eq!(refs.outstanding(), 0);
        assert_eq!(refs.acquired(), refs.released());
    }
}
