//! Device registry
//!
//! The registry is the single owner of all [`DeviceNode`]s, keyed by
//! [`DeviceIdentity`]. Hubs (and the virtual root hub) only refer to their
//! children by identity through their [`PortSet`]s.

use crate::identity::DeviceIdentity;
use crate::node::{DeviceNode, NodeInfo};
use crate::ports::PortSet;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Device attached to a hub port, with everything below it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// Port on the parent hub
    pub port: u8,
    pub device: NodeInfo,
    /// Devices attached to this node's ports (empty for leaf devices)
    pub children: Vec<TreeNode>,
}

/// Registered devices plus the root hub's ports
#[derive(Debug)]
pub struct Registry<H> {
    nodes: HashMap<DeviceIdentity, DeviceNode<H>>,
    root: PortSet,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            root: PortSet::new(),
        }
    }
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.nodes.contains_key(identity)
    }

    pub fn get(&self, identity: &DeviceIdentity) -> Option<&DeviceNode<H>> {
        self.nodes.get(identity)
    }

    /// Register a node
    ///
    /// Returns the node back if its identity is already registered; the
    /// existing node is never replaced.
    pub fn insert(&mut self, node: DeviceNode<H>) -> Option<DeviceNode<H>> {
        if self.nodes.contains_key(node.identity()) {
            return Some(node);
        }
        self.nodes.insert(*node.identity(), node);
        None
    }

    /// Remove every node whose identity is not in `present`
    ///
    /// The removed nodes are returned so the caller decides when their
    /// native references are released.
    pub fn evict_missing(&mut self, present: &HashSet<DeviceIdentity>) -> Vec<DeviceNode<H>> {
        let missing: Vec<DeviceIdentity> = self
            .nodes
            .keys()
            .filter(|identity| !present.contains(*identity))
            .copied()
            .collect();

        missing
            .iter()
            .filter_map(|identity| self.nodes.remove(identity))
            .collect()
    }

    /// Evict missing nodes that no port refers to any more
    ///
    /// Used by hub passes, which only diff part of the tree: devices gone
    /// from elsewhere stay registered until a pass covers their hub.
    pub fn evict_missing_unattached(
        &mut self,
        present: &HashSet<DeviceIdentity>,
    ) -> Vec<DeviceNode<H>> {
        let attached: HashSet<DeviceIdentity> = self
            .nodes
            .values()
            .filter_map(DeviceNode::ports)
            .chain(std::iter::once(&self.root))
            .flat_map(PortSet::attached_identities)
            .collect();

        let missing: Vec<DeviceIdentity> = self
            .nodes
            .keys()
            .filter(|identity| !present.contains(*identity) && !attached.contains(*identity))
            .copied()
            .collect();

        missing
            .iter()
            .filter_map(|identity| self.nodes.remove(identity))
            .collect()
    }

    /// Ports of a hub, `None` selects the root hub
    ///
    /// Returns `None` for unknown identities and leaf devices.
    pub fn ports(&self, hub: Option<&DeviceIdentity>) -> Option<&PortSet> {
        match hub {
            None => Some(&self.root),
            Some(identity) => self.nodes.get(identity)?.ports(),
        }
    }

    pub fn ports_mut(&mut self, hub: Option<&DeviceIdentity>) -> Option<&mut PortSet> {
        match hub {
            None => Some(&mut self.root),
            Some(identity) => self.nodes.get_mut(identity)?.ports_mut(),
        }
    }

    /// Parent a node hangs off, falling back to the root hub
    ///
    /// A recorded parent that is not registered resolves to the root. This
    /// happens on hosts where some hubs cannot be enumerated.
    pub fn resolved_parent(&self, identity: &DeviceIdentity) -> Option<DeviceIdentity> {
        self.nodes
            .get(identity)?
            .parent()
            .filter(|parent| self.nodes.contains_key(*parent))
            .copied()
    }

    /// Port a node is attached to on its resolved parent
    pub fn port_of(&self, identity: &DeviceIdentity) -> Option<u8> {
        let parent = self.resolved_parent(identity);
        self.ports(parent.as_ref())?.port_of(identity)
    }

    /// Snapshot of a single node
    pub fn info(&self, identity: &DeviceIdentity) -> Option<NodeInfo> {
        let node = self.nodes.get(identity)?;
        Some(node.info(self.port_of(identity)))
    }

    /// Snapshots of all registered nodes, ordered by bus and address
    pub fn infos(&self) -> Vec<NodeInfo> {
        let mut infos: Vec<NodeInfo> = self
            .nodes
            .values()
            .map(|node| node.info(self.port_of(node.identity())))
            .collect();
        infos.sort_by_key(|info| (info.identity.bus, info.identity.address, info.identity.port));
        infos
    }

    /// Nodes attached to a hub's ports, in port order
    ///
    /// `None` selects the root hub. Returns `None` if the hub is unknown.
    pub fn attached(&self, hub: Option<&DeviceIdentity>) -> Option<Vec<NodeInfo>> {
        if let Some(identity) = hub
            && !self.nodes.contains_key(identity)
        {
            return None;
        }

        let Some(ports) = self.ports(hub) else {
            return Some(Vec::new());
        };

        Some(
            ports
                .attached()
                .filter_map(|(port, child)| Some(self.nodes.get(child)?.info(Some(port))))
                .collect(),
        )
    }

    /// The attached device tree below the root hub
    pub fn tree(&self) -> Vec<TreeNode> {
        self.subtree(None)
    }

    fn subtree(&self, hub: Option<&DeviceIdentity>) -> Vec<TreeNode> {
        let Some(ports) = self.ports(hub) else {
            return Vec::new();
        };

        ports
            .attached()
            .filter_map(|(port, child)| {
                let node = self.nodes.get(child)?;
                Some(TreeNode {
                    port,
                    device: node.info(Some(port)),
                    children: self.subtree(Some(child)),
                })
            })
            .collect()
    }
}
