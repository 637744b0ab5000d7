//! Topology event delivery tests
//!
//! Subscribers are plain async channels, so these run on a tokio runtime the
//! way an async host application would consume them.

use std::time::Duration;
use topology::test_utils::{DEFAULT_TEST_TIMEOUT, MockBus, MockDevice};
use topology::{DeviceManager, ScannerConfig, TopologyEvent};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("topology=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_events_follow_synchronous_scans() {
    init_tracing();
    let bus = MockBus::new();
    let hub = MockDevice::hub(1, 1, 1);
    let leaf = MockDevice::leaf(1, 2, 4, 0x046d, 0xc52b).with_parent(&hub);
    bus.set_devices(vec![hub.clone(), leaf.clone()]);

    let manager = DeviceManager::new(bus.clone(), ScannerConfig::default());
    let events = manager.subscribe();
    manager.scan().unwrap();

    // Hub first, then the device below it
    match events.recv().await.unwrap() {
        TopologyEvent::DeviceAttached { hub: parent, port, device } => {
            assert_eq!(parent, None);
            assert_eq!(port, 1);
            assert_eq!(device.identity, hub.identity());
        }
        other => panic!("unexpected event {:?}", other),
    }
    match events.recv().await.unwrap() {
        TopologyEvent::DeviceAttached { hub: parent, port, device } => {
            assert_eq!(parent, Some(hub.identity()));
            assert_eq!(port, 4);
            assert_eq!(device.identity, leaf.identity());
        }
        other => panic!("unexpected event {:?}", other),
    }

    bus.unplug(1, 2);
    manager.scan().unwrap();
    let event = events.recv().await.unwrap();
    assert!(!event.is_attach());
    assert_eq!(event.identity(), &leaf.identity());
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_background_loop_delivers_events() {
    init_tracing();
    let bus = MockBus::new();
    let manager = DeviceManager::new(
        bus.clone(),
        ScannerConfig::with_interval(Duration::from_millis(10)),
    );
    let events = manager.subscribe();
    manager.start().unwrap();

    let leaf = MockDevice::leaf(1, 7, 2, 0x1234, 0x5678);
    bus.plug(leaf.clone());

    let event = tokio::time::timeout(DEFAULT_TEST_TIMEOUT, events.recv())
        .await
        .expect("no event before timeout")
        .unwrap();
    assert!(event.is_attach());
    assert_eq!(event.identity(), &leaf.identity());

    manager.shutdown();
}

#[tokio::test]
async fn test_dropped_subscriber_is_pruned() {
    init_tracing();
    let bus = MockBus::new();
    let manager = DeviceManager::new(bus.clone(), ScannerConfig::default());

    let dropped = manager.subscribe();
    let kept = manager.subscribe();
    drop(dropped);

    bus.plug(MockDevice::leaf(1, 2, 1, 0x1234, 0x0001));
    manager.scan().unwrap();
    assert_eq!(kept.len(), 1);

    bus.plug(MockDevice::leaf(1, 3, 2, 0x1234, 0x0002));
    manager.scan().unwrap();
    assert_eq!(kept.len(), 2);
}

#[tokio::test]
async fn test_registered_sender_receives_events() {
    init_tracing();
    let bus = MockBus::new();
    let (tx, rx) = async_channel::unbounded();
    let manager = DeviceManager::new(bus.clone(), ScannerConfig::default()).with_events(tx);
    let subscriber = manager.subscribe();

    let leaf = MockDevice::leaf(1, 2, 3, 0x1234, 0x5678);
    bus.plug(leaf.clone());
    manager.scan().unwrap();

    let from_sender = rx.recv().await.unwrap();
    let from_subscriber = subscriber.recv().await.unwrap();
    assert_eq!(from_sender, from_subscriber);
    assert_eq!(from_sender.identity(), &leaf.identity());
}

#[tokio::test]
async fn test_full_channel_stays_registered() {
    init_tracing();
    let bus = MockBus::new();
    let (tx, rx) = async_channel::bounded(1);
    let manager = DeviceManager::new(bus.clone(), ScannerConfig::default()).with_events(tx);

    bus.plug(MockDevice::leaf(1, 2, 1, 0x1234, 0x0001));
    bus.plug(MockDevice::leaf(1, 3, 2, 0x1234, 0x0002));
    manager.scan().unwrap();

    // Second attach did not fit
    assert_eq!(rx.len(), 1);
    rx.recv().await.unwrap();

    let third = MockDevice::leaf(1, 4, 3, 0x1234, 0x0003);
    bus.plug(third.clone());
    manager.scan().unwrap();
    assert_eq!(rx.recv().await.unwrap().identity(), &third.identity());
}
