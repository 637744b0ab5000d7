//! Test utilities
//!
//! Provides an in-memory [`UsbEnumerator`] that behaves like a host USB stack:
//! devices can be plugged and unplugged, enumeration and descriptor reads can
//! be made to fail, and every native reference taken or given back is counted
//! so tests can check that scans neither leak nor double-release handles.
//!
//! # Example
//!
//! ```
//! use topology::test_utils::{MockBus, MockDevice};
//! use topology::{DeviceManager, ScannerConfig};
//!
//! let bus = MockBus::new();
//! let hub = MockDevice::hub(1, 2, 1);
//! bus.plug(hub.clone());
//! bus.plug(MockDevice::leaf(1, 3, 2, 0x046d, 0xc52b).with_parent(&hub));
//!
//! let manager = DeviceManager::new(bus.clone(), ScannerConfig::default());
//! manager.scan().unwrap();
//! assert_eq!(manager.len(), 2);
//! assert_eq!(bus.refs().outstanding(), 2);
//! ```

use crate::identity::{DescriptorFingerprint, DeviceIdentity, HUB_CLASS};
use crate::native::{NativeDevice, UsbEnumerator};
use crate::speed::DeviceSpeed;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts native references taken and given back
#[derive(Debug, Default)]
pub struct RefCounter {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl RefCounter {
    fn acquire(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    /// Total references taken
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Total references given back
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// References currently held
    pub fn outstanding(&self) -> usize {
        self.acquired() - self.released()
    }
}

/// A simulated USB device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    pub bus: u8,
    pub address: u8,
    pub port: u8,
    pub speed: DeviceSpeed,
    pub descriptor: DescriptorFingerprint,
    /// (bus, address) of the parent hub
    pub parent: Option<(u8, u8)>,
    /// Error returned when the descriptor is read
    pub descriptor_error: Option<rusb::Error>,
}

impl MockDevice {
    /// Create a hub
    pub fn hub(bus: u8, address: u8, port: u8) -> Self {
        Self {
            bus,
            address,
            port,
            speed: DeviceSpeed::High,
            descriptor: DescriptorFingerprint::new(0x05e3, 0x0608, HUB_CLASS),
            parent: None,
            descriptor_error: None,
        }
    }

    /// Create a non-hub device
    pub fn leaf(bus: u8, address: u8, port: u8, vendor_id: u16, product_id: u16) -> Self {
        Self {
            bus,
            address,
            port,
            speed: DeviceSpeed::Full,
            descriptor: DescriptorFingerprint::new(vendor_id, product_id, 0),
            parent: None,
            descriptor_error: None,
        }
    }

    /// Attach this device below the given hub
    pub fn with_parent(mut self, parent: &MockDevice) -> Self {
        self.parent = Some((parent.bus, parent.address));
        self
    }

    /// Make descriptor reads fail with an I/O error
    pub fn with_failing_descriptor(mut self) -> Self {
        self.descriptor_error = Some(rusb::Error::Io);
        self
    }

    pub fn with_speed(mut self, speed: DeviceSpeed) -> Self {
        self.speed = speed;
        self
    }

    /// Identity the scanner will compute for this device
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.bus, self.address, self.port, self.descriptor)
    }
}

#[derive(Debug, Default)]
struct BusState {
    devices: Vec<MockDevice>,
    enumeration_error: Option<rusb::Error>,
    enumeration_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct BusInner {
    state: Mutex<BusState>,
    refs: Arc<RefCounter>,
    enumerations: AtomicUsize,
}

/// Simulated host USB stack
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    inner: Arc<BusInner>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a device (replaces a device with the same bus/address)
    pub fn plug(&self, device: MockDevice) {
        let mut state = self.inner.state.lock();
        state
            .devices
            .retain(|d| (d.bus, d.address) != (device.bus, device.address));
        state.devices.push(device);
    }

    /// Unplug a device, returning it if it was present
    pub fn unplug(&self, bus: u8, address: u8) -> Option<MockDevice> {
        let mut state = self.inner.state.lock();
        let index = state
            .devices
            .iter()
            .position(|d| (d.bus, d.address) == (bus, address))?;
        Some(state.devices.remove(index))
    }

    /// Replace the whole device set
    pub fn set_devices(&self, devices: Vec<MockDevice>) {
        self.inner.state.lock().devices = devices;
    }

    /// Currently plugged devices
    pub fn devices_snapshot(&self) -> Vec<MockDevice> {
        self.inner.state.lock().devices.clone()
    }

    /// Make the next enumeration fail with the given error
    pub fn fail_next_enumeration(&self, error: rusb::Error) {
        self.inner.state.lock().enumeration_error = Some(error);
    }

    /// Slow down every enumeration, to widen race windows in stress tests
    pub fn set_enumeration_delay(&self, delay: Option<Duration>) {
        self.inner.state.lock().enumeration_delay = delay;
    }

    /// Reference counter shared by all handles of this bus
    pub fn refs(&self) -> Arc<RefCounter> {
        Arc::clone(&self.inner.refs)
    }

    /// Number of enumeration calls so far (failed ones included)
    pub fn enumeration_count(&self) -> usize {
        self.inner.enumerations.load(Ordering::SeqCst)
    }

    /// Take a new reference on a device
    pub fn handle_for(&self, device: &MockDevice) -> MockHandle {
        MockHandle::new(Arc::clone(&self.inner), device.clone())
    }
}

impl UsbEnumerator for MockBus {
    type Device = MockHandle;

    fn devices(&self) -> Result<Vec<MockHandle>, rusb::Error> {
        self.inner.enumerations.fetch_add(1, Ordering::SeqCst);

        let (devices, delay) = {
            let mut state = self.inner.state.lock();
            if let Some(error) = state.enumeration_error.take() {
                return Err(error);
            }
            (state.devices.clone(), state.enumeration_delay)
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        Ok(devices
            .into_iter()
            .map(|device| MockHandle::new(Arc::clone(&self.inner), device))
            .collect())
    }
}

/// Counted reference on a [`MockDevice`]
#[derive(Debug)]
pub struct MockHandle {
    bus: Arc<BusInner>,
    device: MockDevice,
}

impl MockHandle {
    fn new(bus: Arc<BusInner>, device: MockDevice) -> Self {
        bus.refs.acquire();
        Self { bus, device }
    }

    /// The simulated device behind this handle
    pub fn device(&self) -> &MockDevice {
        &self.device
    }
}

impl Clone for MockHandle {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.bus), self.device.clone())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.bus.refs.release();
    }
}

impl NativeDevice for MockHandle {
    fn bus_number(&self) -> u8 {
        self.device.bus
    }

    fn address(&self) -> u8 {
        self.device.address
    }

    fn port_number(&self) -> u8 {
        self.device.port
    }

    fn speed(&self) -> DeviceSpeed {
        self.device.speed
    }

    fn descriptor(&self) -> Result<DescriptorFingerprint, rusb::Error> {
        match self.device.descriptor_error {
            Some(error) => Err(error),
            None => Ok(self.device.descriptor),
        }
    }

    fn parent(&self) -> Option<Self> {
        let (bus, address) = self.device.parent?;
        let parent = {
            let state = self.bus.state.lock();
            state
                .devices
                .iter()
                .find(|d| (d.bus, d.address) == (bus, address))
                .cloned()
        }?;
        Some(MockHandle::new(Arc::clone(&self.bus), parent))
    }
}
