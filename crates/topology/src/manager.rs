//! USB device manager
//!
//! Entry point for host applications. Owns the topology scanner and the
//! optional background scan thread, and hands out native device references
//! by identity.

use crate::config::ScannerConfig;
use crate::error::Result;
use crate::events::TopologyEvent;
use crate::identity::DeviceIdentity;
use crate::native::{RusbEnumerator, UsbEnumerator};
use crate::node::NodeInfo;
use crate::registry::TreeNode;
use crate::scanner::{ScanSummary, TopologyScanner};
use crate::worker::{ScanLoop, spawn_scan_loop};
use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// USB device manager
///
/// Keeps a live tree of attached USB devices, refreshed by explicit
/// [`scan`](Self::scan) calls and, once [`start`](Self::start)ed, by a
/// background thread. Dropping the manager stops the background thread.
pub struct DeviceManager<E: UsbEnumerator = RusbEnumerator> {
    scanner: Arc<TopologyScanner<E>>,
    config: ScannerConfig,
    scan_loop: Mutex<Option<ScanLoop>>,
}

impl DeviceManager<RusbEnumerator> {
    /// Create a manager on a new libusb context
    pub fn open(config: ScannerConfig) -> Result<Self> {
        Ok(Self::new(RusbEnumerator::new()?, config))
    }
}

impl<E: UsbEnumerator> DeviceManager<E> {
    /// Create a manager on the given enumerator
    pub fn new(enumerator: E, config: ScannerConfig) -> Self {
        Self {
            scanner: Arc::new(TopologyScanner::new(enumerator)),
            config,
            scan_loop: Mutex::new(None),
        }
    }

    /// Send topology events to `sender` in addition to any subscribers
    pub fn with_events(self, sender: Sender<TopologyEvent>) -> Self {
        self.scanner.register(sender);
        self
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn scanner(&self) -> &TopologyScanner<E> {
        &self.scanner
    }

    /// Scan for added and removed devices now
    pub fn scan(&self) -> Result<ScanSummary> {
        self.scanner.scan()
    }

    /// Rescan the subtree below one hub
    ///
    /// Fails with [`DeviceNotFound`](crate::TopologyError::DeviceNotFound)
    /// for unknown identities and [`NotAHub`](crate::TopologyError::NotAHub)
    /// for leaf devices.
    pub fn scan_hub(&self, hub: &DeviceIdentity) -> Result<ScanSummary> {
        self.scanner.scan_hub(hub)
    }

    /// Scan unless a scan already completed
    pub fn first_scan(&self) -> Result<Option<ScanSummary>> {
        self.scanner.first_scan()
    }

    pub fn has_scanned(&self) -> bool {
        self.scanner.has_scanned()
    }

    /// Start scanning in the background
    ///
    /// Does nothing if the background thread is already running.
    pub fn start(&self) -> Result<()> {
        let mut scan_loop = self.scan_loop.lock();
        if scan_loop.as_ref().is_some_and(ScanLoop::is_running) {
            debug!("USB scanner already running");
            return Ok(());
        }

        *scan_loop = Some(spawn_scan_loop(
            Arc::clone(&self.scanner),
            self.config.scan_interval,
        )?);
        info!(
            "Started background USB scanning every {:?}",
            self.config.scan_interval
        );
        Ok(())
    }

    /// Stop background scanning and wait for the thread to exit
    ///
    /// Device references handed out earlier stay valid.
    pub fn shutdown(&self) {
        let scan_loop = self.scan_loop.lock().take();
        if let Some(scan_loop) = scan_loop {
            scan_loop.shutdown();
            info!("Stopped background USB scanning");
        }
    }

    pub fn is_running(&self) -> bool {
        self.scan_loop
            .lock()
            .as_ref()
            .is_some_and(ScanLoop::is_running)
    }

    /// Receive topology events of all following scans
    pub fn subscribe(&self) -> Receiver<TopologyEvent> {
        self.scanner.subscribe()
    }

    /// Get a new reference on the native device with this identity
    ///
    /// Fails with [`DeviceNotFound`](crate::TopologyError::DeviceNotFound) if
    /// the device is not (or no longer) registered. Release the reference
    /// with [`release`](Self::release) or by dropping it.
    pub fn handle(&self, identity: &DeviceIdentity) -> Result<E::Device> {
        self.scanner.handle(identity)
    }

    /// Release a device reference obtained from [`handle`](Self::handle)
    pub fn release(&self, handle: E::Device) {
        drop(handle);
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.scanner.contains(identity)
    }

    pub fn device(&self, identity: &DeviceIdentity) -> Result<NodeInfo> {
        self.scanner.device(identity)
    }

    pub fn devices(&self) -> Vec<NodeInfo> {
        self.scanner.devices()
    }

    /// Devices attached to a hub, `None` selects the root hub
    pub fn attached(&self, hub: Option<&DeviceIdentity>) -> Result<Vec<NodeInfo>> {
        self.scanner.attached(hub)
    }

    pub fn tree(&self) -> Vec<TreeNode> {
        self.scanner.tree()
    }

    pub fn len(&self) -> usize {
        self.scanner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanner.is_empty()
    }
}

impl<E: UsbEnumerator> Drop for DeviceManager<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockBus, MockDevice};
    use std::time::Duration;

    #[test]
    fn test_start_is_idempotent() {
        let bus = MockBus::new();
        let manager = DeviceManager::new(bus, ScannerConfig::with_interval(Duration::from_millis(20)));
        assert!(!manager.is_running());

        manager.start().unwrap();
        manager.start().unwrap();
        assert!(manager.is_running());

        manager.shutdown();
        assert!(!manager.is_running());

        // Restart after shutdown
        manager.start().unwrap();
        assert!(manager.is_running());
    }

    #[test]
    fn test_release_gives_reference_back() {
        let bus = MockBus::new();
        let leaf = MockDevice::leaf(1, 2, 1, 0x1234, 0x5678);
        bus.plug(leaf.clone());
        let manager = DeviceManager::new(bus.clone(), ScannerConfig::default());
        manager.scan().unwrap();

        let refs = bus.refs();
        let handle = manager.handle(&leaf.identity()).unwrap();
        assert_eq!(refs.outstanding(), 2);
        manager.release(handle);
        assert_eq!(refs.outstanding(), 1);
    }

    #[test]
    fn test_caller_reference_outlives_manager() {
        let bus = MockBus::new();
        let leaf = MockDevice::leaf(1, 2, 1, 0x1234, 0x5678);
        bus.plug(leaf.clone());
        let manager = DeviceManager::new(bus.clone(), ScannerConfig::default());
        manager.scan().unwrap();

        let handle = manager.handle(&leaf.identity()).unwrap();
        drop(manager);
        assert_eq!(bus.refs().outstanding(), 1);
        assert_eq!(handle.device(), &leaf);
    }

    #[test]
    fn test_default_interval() {
        let manager = DeviceManager::new(MockBus::new(), ScannerConfig::default());
        assert_eq!(manager.config().scan_interval, Duration::from_millis(500));
    }
}
