//! Topology scanner
//!
//! One scan pass reconciles the registry against a fresh native snapshot:
//!
//! 1. Every device of the snapshot is identified. Known identities are only
//!    confirmed present; unknown ones become new nodes that keep the snapshot
//!    reference. Devices whose descriptor cannot be read are skipped.
//! 2. The hub tree is diffed depth-first from the root hub: stale children
//!    are detached bottom-up, then new children are attached top-down.
//! 3. Nodes that were not confirmed present are evicted and their native
//!    references released.
//!
//! Passes are serialized. The registry is behind a read/write lock and is
//! only write-locked for the in-memory part of a pass, so readers never see
//! a half-applied pass and never wait for device I/O.

use crate::error::{Result, TopologyError};
use crate::events::TopologyEvent;
use crate::identity::DeviceIdentity;
use crate::native::{NativeDevice, UsbEnumerator};
use crate::node::{DeviceNode, NodeInfo};
use crate::registry::{Registry, TreeNode};
use async_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Outcome of one scan pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Devices identified in the snapshot
    pub present: usize,
    /// Nodes created
    pub added: usize,
    /// Nodes evicted
    pub removed: usize,
    /// Devices skipped because their descriptor could not be read
    pub skipped: usize,
    /// Port attachments made
    pub attached: usize,
    /// Port detachments made
    pub detached: usize,
}

impl ScanSummary {
    /// Check if the pass changed the registry or the tree
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.removed > 0 || self.attached > 0 || self.detached > 0
    }
}

/// Reconciles the device registry with native enumeration snapshots
pub struct TopologyScanner<E: UsbEnumerator> {
    enumerator: E,
    registry: RwLock<Registry<E::Device>>,
    /// Serializes scan passes
    scan_lock: Mutex<()>,
    scanned: AtomicBool,
    subscribers: Mutex<Vec<Sender<TopologyEvent>>>,
}

impl<E: UsbEnumerator> TopologyScanner<E> {
    pub fn new(enumerator: E) -> Self {
        Self {
            enumerator,
            registry: RwLock::new(Registry::new()),
            scan_lock: Mutex::new(()),
            scanned: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn enumerator(&self) -> &E {
        &self.enumerator
    }

    /// Run a scan pass
    ///
    /// Blocks while another pass is in flight, then runs its own. An
    /// enumeration failure leaves registry and tree untouched.
    pub fn scan(&self) -> Result<ScanSummary> {
        let _guard = self.scan_lock.lock();
        self.reconcile(None)
    }

    /// Run a scan pass limited to the subtree below a hub
    ///
    /// The registry is refreshed from a full snapshot, but ports are only
    /// diffed below `hub`. Devices gone from elsewhere in the tree stay
    /// registered until a pass covers their hub. Does not count as the
    /// first scan.
    pub fn scan_hub(&self, hub: &DeviceIdentity) -> Result<ScanSummary> {
        let _guard = self.scan_lock.lock();
        match self.registry.read().get(hub) {
            None => return Err(TopologyError::DeviceNotFound(*hub)),
            Some(node) if !node.is_hub() => return Err(TopologyError::NotAHub(*hub)),
            Some(_) => {}
        }
        self.reconcile(Some(hub))
    }

    /// Run a scan pass unless one already completed
    pub fn first_scan(&self) -> Result<Option<ScanSummary>> {
        let _guard = self.scan_lock.lock();
        if self.scanned.load(Ordering::Acquire) {
            return Ok(None);
        }
        self.reconcile(None).map(Some)
    }

    /// Check if a scan pass has completed successfully
    pub fn has_scanned(&self) -> bool {
        self.scanned.load(Ordering::Acquire)
    }

    /// Receive topology events of all following passes
    pub fn subscribe(&self) -> Receiver<TopologyEvent> {
        let (tx, rx) = async_channel::unbounded();
        self.register(tx);
        rx
    }

    /// Send topology events of all following passes to an existing channel
    ///
    /// Bounded channels that are full lose the events of that pass.
    pub fn register(&self, sender: Sender<TopologyEvent>) {
        self.subscribers.lock().push(sender);
    }

    /// Get a new reference on a registered device
    ///
    /// The registry keeps its own reference; the caller releases the returned
    /// one by dropping it.
    pub fn handle(&self, identity: &DeviceIdentity) -> Result<E::Device> {
        self.registry
            .read()
            .get(identity)
            .map(DeviceNode::acquire_handle)
            .ok_or(TopologyError::DeviceNotFound(*identity))
    }

    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.registry.read().contains(identity)
    }

    /// Snapshot of one registered device
    pub fn device(&self, identity: &DeviceIdentity) -> Result<NodeInfo> {
        self.registry
            .read()
            .info(identity)
            .ok_or(TopologyError::DeviceNotFound(*identity))
    }

    /// Snapshots of all registered devices
    pub fn devices(&self) -> Vec<NodeInfo> {
        self.registry.read().infos()
    }

    /// Devices attached to a hub, `None` selects the root hub
    pub fn attached(&self, hub: Option<&DeviceIdentity>) -> Result<Vec<NodeInfo>> {
        let registry = self.registry.read();
        match hub {
            Some(identity) => registry
                .attached(Some(identity))
                .ok_or(TopologyError::DeviceNotFound(*identity)),
            None => Ok(registry.attached(None).unwrap_or_default()),
        }
    }

    /// The current device tree
    pub fn tree(&self) -> Vec<TreeNode> {
        self.registry.read().tree()
    }

    /// Reconcile against a fresh snapshot, diffing ports below `scope`
    /// (`None` is the root hub, i.e. the whole tree)
    fn reconcile(&self, scope: Option<&DeviceIdentity>) -> Result<ScanSummary> {
        let snapshot = self
            .enumerator
            .devices()
            .map_err(TopologyError::Enumeration)?;

        let mut summary = ScanSummary::default();
        // Snapshot order is kept for attaching siblings
        let mut present: Vec<DeviceIdentity> = Vec::with_capacity(snapshot.len());
        let mut present_set: HashSet<DeviceIdentity> = HashSet::with_capacity(snapshot.len());
        let mut created: Vec<DeviceNode<E::Device>> = Vec::new();

        for device in snapshot {
            let identity = match DeviceIdentity::read(&device) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!("{}", e);
                    summary.skipped += 1;
                    continue;
                }
            };

            if !present_set.insert(identity) {
                debug!("Ignoring duplicate snapshot entry for {}", identity);
                continue;
            }
            present.push(identity);

            if self.registry.read().contains(&identity) {
                continue;
            }

            created.push(self.create_node(identity, device));
        }
        summary.present = present.len();

        let mut events = Vec::new();
        let evicted = {
            let mut registry = self.registry.write();

            for node in created {
                debug!(
                    "Added device {}: parent={:?}, speed={}, hub={}",
                    node.identity(),
                    node.parent().map(ToString::to_string),
                    node.speed(),
                    node.is_hub()
                );
                if registry.insert(node).is_none() {
                    summary.added += 1;
                }
            }

            detach_removed(&mut registry, scope, &present_set, &mut events);
            attach_new(&mut registry, scope, &present, &present_set, &mut events);

            match scope {
                None => registry.evict_missing(&present_set),
                Some(_) => registry.evict_missing_unattached(&present_set),
            }
        };

        summary.removed = evicted.len();
        for node in &evicted {
            debug!("Removed device {}", node.identity());
        }
        // Native references of evicted nodes are released here, outside the lock
        drop(evicted);

        summary.attached = events.iter().filter(|e| e.is_attach()).count();
        summary.detached = events.len() - summary.attached;
        if scope.is_none() {
            self.scanned.store(true, Ordering::Release);
        }

        if summary.has_changes() {
            info!(
                "USB topology updated: {} added, {} removed, {} devices present",
                summary.added, summary.removed, summary.present
            );
        } else {
            debug!("USB scan: {} devices present, no changes", summary.present);
        }

        self.publish(events);
        Ok(summary)
    }

    /// Build a node for a newly seen device, keeping the snapshot reference
    fn create_node(&self, identity: DeviceIdentity, device: E::Device) -> DeviceNode<E::Device> {
        // The parent reference is only needed to read its identity
        let parent = device.parent().and_then(|parent| match DeviceIdentity::read(&parent) {
            Ok(parent_identity) => Some(parent_identity),
            Err(e) => {
                debug!("Parent of {} not identifiable, using root hub: {}", identity, e);
                None
            }
        });
        let speed = device.speed();
        DeviceNode::new(identity, parent, speed, device)
    }

    fn publish(&self, events: Vec<TopologyEvent>) {
        if events.is_empty() {
            return;
        }

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| {
            for event in &events {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("Topology event channel full, dropping events of this pass");
                        return true;
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Topology event subscriber gone, dropping it");
                        return false;
                    }
                }
            }
            true
        });
    }
}

/// Parent the node hangs off after this pass, falling back to the root hub
fn resolved_parent<H>(
    registry: &Registry<H>,
    identity: &DeviceIdentity,
    present: &HashSet<DeviceIdentity>,
) -> Option<DeviceIdentity> {
    registry
        .get(identity)?
        .parent()
        .filter(|parent| present.contains(*parent))
        .copied()
}

/// Detach stale children of a hub, deepest hubs first
///
/// A child is stale when it is gone from the snapshot or no longer resolves
/// to this hub as its parent.
fn detach_removed<H>(
    registry: &mut Registry<H>,
    hub: Option<&DeviceIdentity>,
    present: &HashSet<DeviceIdentity>,
    events: &mut Vec<TopologyEvent>,
) {
    let children: Vec<(u8, DeviceIdentity)> = match registry.ports(hub) {
        Some(ports) => ports.attached().map(|(port, id)| (port, *id)).collect(),
        None => return,
    };

    for (port, child) in children {
        if registry.get(&child).is_some_and(DeviceNode::is_hub) {
            detach_removed(registry, Some(&child), present, events);
        }

        let keep = present.contains(&child)
            && resolved_parent(registry, &child, present).as_ref() == hub;
        if keep {
            continue;
        }

        if let Some(ports) = registry.ports_mut(hub) {
            ports.detach(&child);
        }
        debug!("Detached {} from port {}", child, port);
        events.push(TopologyEvent::DeviceDetached {
            hub: hub.copied(),
            port,
            identity: child,
        });
    }
}

/// Attach present devices whose resolved parent is this hub, then descend
fn attach_new<H>(
    registry: &mut Registry<H>,
    hub: Option<&DeviceIdentity>,
    order: &[DeviceIdentity],
    present: &HashSet<DeviceIdentity>,
    events: &mut Vec<TopologyEvent>,
) {
    for identity in order {
        if resolved_parent(registry, identity, present).as_ref() != hub {
            continue;
        }
        let Some(node) = registry.get(identity) else {
            continue;
        };
        let is_hub = node.is_hub();
        let info = node.info(None);

        if let Some(ports) = registry.ports_mut(hub)
            && !ports.is_attached(identity)
        {
            let port = ports.attach(*identity, identity.port);
            debug!("Attached {} to port {}", identity, port);
            events.push(TopologyEvent::DeviceAttached {
                hub: hub.copied(),
                port,
                device: NodeInfo {
                    port: Some(port),
                    ..info
                },
            });
        }

        if is_hub {
            attach_new(registry, Some(identity), order, present, events);
        }
    }
}
