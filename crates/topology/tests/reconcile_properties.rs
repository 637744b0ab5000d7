//! Property-based tests for scan reconciliation
//!
//! Random plug/unplug sequences (with random descriptor read failures) over a
//! small three-tier hub topology. After every pass the registry, the tree and
//! the native reference count must agree.

use proptest::prelude::*;
use std::collections::HashSet;
use topology::test_utils::{MockBus, MockDevice};
use topology::{DeviceIdentity, DeviceManager, ScannerConfig, TreeNode};

/// Root hub, a hub below it, and leaves hanging off both
fn universe() -> Vec<MockDevice> {
    let top = MockDevice::hub(1, 1, 1);
    let inner = MockDevice::hub(1, 2, 2).with_parent(&top);
    vec![
        top.clone(),
        inner.clone(),
        MockDevice::leaf(1, 3, 1, 0x1234, 0x0001).with_parent(&top),
        MockDevice::leaf(1, 4, 1, 0x1234, 0x0002).with_parent(&inner),
        MockDevice::leaf(1, 5, 2, 0x1234, 0x0003).with_parent(&inner),
        MockDevice::leaf(1, 6, 3, 0x1234, 0x0004),
        MockDevice::leaf(2, 1, 1, 0x046d, 0xc52b),
    ]
}

/// One bus state: which devices are plugged, and which of them fail
fn step_strategy() -> impl Strategy<Value = (Vec<bool>, Vec<bool>)> {
    let n = universe().len();
    (
        proptest::collection::vec(any::<bool>(), n),
        proptest::collection::vec(prop::bool::weighted(0.15), n),
    )
}

fn apply(bus: &MockBus, plugged: &[bool], failing: &[bool]) {
    let devices = universe()
        .into_iter()
        .zip(plugged.iter().zip(failing))
        .filter(|(_, (plugged, _))| **plugged)
        .map(|(device, (_, failing))| {
            if *failing {
                device.with_failing_descriptor()
            } else {
                device
            }
        })
        .collect();
    bus.set_devices(devices);
}

/// Collect (tree parent, identity) pairs, failing on duplicates
fn walk(
    tree: &[TreeNode],
    parent: Option<DeviceIdentity>,
    seen: &mut HashSet<DeviceIdentity>,
    edges: &mut Vec<(Option<DeviceIdentity>, DeviceIdentity)>,
) -> bool {
    for node in tree {
        if !seen.insert(node.device.identity) {
            return false;
        }
        edges.push((parent, node.device.identity));
        if !walk(&node.children, Some(node.device.identity), seen, edges) {
            return false;
        }
    }
    true
}

proptest! {
    /// Property: after every pass the registry, the tree and the native
    /// reference count are consistent
    #[test]
    fn prop_registry_tree_and_refs_agree(
        steps in proptest::collection::vec(step_strategy(), 1..12),
    ) {
        let bus = MockBus::new();
        let refs = bus.refs();
        let manager = DeviceManager::new(bus.clone(), ScannerConfig::default());

        for (plugged, failing) in &steps {
            apply(&bus, plugged, failing);
            manager.scan().unwrap();

            // No leaked or double-released references
            prop_assert_eq!(refs.outstanding(), manager.len());

            // Identities are unique and match the readable plugged devices
            let registered: HashSet<DeviceIdentity> =
                manager.devices().iter().map(|d| d.identity).collect();
            prop_assert_eq!(registered.len(), manager.len());
            let expected: HashSet<DeviceIdentity> = bus
                .devices_snapshot()
                .iter()
                .filter(|d| d.descriptor_error.is_none())
                .map(MockDevice::identity)
                .collect();
            prop_assert_eq!(&registered, &expected);

            // Every registered device sits exactly once in the tree, below
            // its recorded parent if registered, else below the root hub
            let mut seen = HashSet::new();
            let mut edges = Vec::new();
            prop_assert!(walk(&manager.tree(), None, &mut seen, &mut edges));
            prop_assert_eq!(&seen, &registered);
            for (tree_parent, identity) in edges {
                let info = manager.device(&identity).unwrap();
                let resolved = info.parent.filter(|p| registered.contains(p));
                prop_assert_eq!(tree_parent, resolved);
            }
        }
    }

    /// Property: a second pass over an unchanged bus changes nothing
    #[test]
    fn prop_rescan_is_idempotent((plugged, failing) in step_strategy()) {
        let bus = MockBus::new();
        let manager = DeviceManager::new(bus.clone(), ScannerConfig::default());
        apply(&bus, &plugged, &failing);

        manager.scan().unwrap();
        let tree = manager.tree();
        let devices = manager.devices();

        let summary = manager.scan().unwrap();
        prop_assert!(!summary.has_changes());
        prop_assert_eq!(manager.tree(), tree);
        prop_assert_eq!(manager.devices(), devices);
    }
}
