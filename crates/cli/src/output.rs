//! Tree and event rendering

use anyhow::{Context, Result};
use std::fmt::Write;
use topology::{DeviceIdentity, TopologyEvent, TreeNode};

/// Render the hub tree, one device per line, indented by depth
///
/// ```text
/// Port 1: Bus 001 Device 002 Port 1: ID 05e3:0608 (hub, 480M)
///     |__ Port 3: Bus 001 Device 005 Port 3: ID 046d:c52b (12M)
/// ```
pub fn render_tree(tree: &[TreeNode]) -> String {
    let mut out = String::new();
    render_level(tree, 0, &mut out);
    out
}

fn render_level(nodes: &[TreeNode], depth: usize, out: &mut String) {
    for node in nodes {
        let indent = "    ".repeat(depth);
        let branch = if depth == 0 { "" } else { "|__ " };
        let kind = if node.device.is_hub { "hub, " } else { "" };
        // Writing to a String cannot fail
        let _ = writeln!(
            out,
            "{}{}Port {}: {} ({}{})",
            indent, branch, node.port, node.device.identity, kind, node.device.speed
        );
        render_level(&node.children, depth + 1, out);
    }
}

pub fn render_tree_json(tree: &[TreeNode]) -> Result<String> {
    serde_json::to_string_pretty(tree).context("Failed to serialize device tree")
}

pub fn render_event(event: &TopologyEvent) -> String {
    match event {
        TopologyEvent::DeviceAttached { hub, port, device } => format!(
            "+ {} attached to {} port {}",
            device.identity,
            hub_name(hub.as_ref()),
            port
        ),
        TopologyEvent::DeviceDetached {
            hub,
            port,
            identity,
        } => format!(
            "- {} detached from {} port {}",
            identity,
            hub_name(hub.as_ref()),
            port
        ),
    }
}

/// One JSON object per line
pub fn render_event_json(event: &TopologyEvent) -> Result<String> {
    serde_json::to_string(event).context("Failed to serialize topology event")
}

fn hub_name(hub: Option<&DeviceIdentity>) -> String {
    match hub {
        Some(hub) => format!("hub [{}]", hub),
        None => "root hub".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology::{DescriptorFingerprint, DeviceSpeed, HUB_CLASS, NodeInfo};

    fn info(address: u8, port: u8, vid: u16, pid: u16, class: u8, speed: DeviceSpeed) -> NodeInfo {
        NodeInfo {
            identity: DeviceIdentity::new(1, address, port, DescriptorFingerprint::new(vid, pid, class)),
            parent: None,
            speed,
            is_hub: class == HUB_CLASS,
            port: Some(port),
        }
    }

    #[test]
    fn test_render_tree_indents_children() {
        let hub = info(2, 1, 0x05e3, 0x0608, HUB_CLASS, DeviceSpeed::High);
        let leaf = info(5, 3, 0x046d, 0xc52b, 0, DeviceSpeed::Full);
        let tree = vec![TreeNode {
            port: 1,
            device: hub,
            children: vec![TreeNode {
                port: 3,
                device: leaf,
                children: vec![],
            }],
        }];

        let text = render_tree(&tree);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Port 1: Bus 001 Device 002 Port 1: ID 05e3:0608 (hub, 480M)",
                "    |__ Port 3: Bus 001 Device 005 Port 3: ID 046d:c52b (12M)",
            ]
        );
    }

    #[test]
    fn test_render_empty_tree() {
        assert_eq!(render_tree(&[]), "");
        assert_eq!(render_tree_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_render_events() {
        let hub = info(2, 1, 0x05e3, 0x0608, HUB_CLASS, DeviceSpeed::High);
        let leaf = info(5, 3, 0x046d, 0xc52b, 0, DeviceSpeed::Full);

        let attached = TopologyEvent::DeviceAttached {
            hub: None,
            port: 1,
            device: hub,
        };
        assert_eq!(
            render_event(&attached),
            "+ Bus 001 Device 002 Port 1: ID 05e3:0608 attached to root hub port 1"
        );

        let detached = TopologyEvent::DeviceDetached {
            hub: Some(hub.identity),
            port: 3,
            identity: leaf.identity,
        };
        assert_eq!(
            render_event(&detached),
            "- Bus 001 Device 005 Port 3: ID 046d:c52b detached from hub [Bus 001 Device 002 Port 1: ID 05e3:0608] port 3"
        );

        let json = render_event_json(&detached).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["DeviceDetached"]["port"], 3);
    }
}
