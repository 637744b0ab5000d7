//! VID:PID display filters
//!
//! Filter format: `0xVID:0xPID`, either side may be `*`
//! (e.g. `0x046d:*` for every Logitech device).

use anyhow::{Result, anyhow, bail};
use topology::{DeviceIdentity, TopologyEvent, TreeNode};

/// Parsed VID:PID filter, `None` matches anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    vendor_id: Option<u16>,
    product_id: Option<u16>,
}

impl DeviceFilter {
    /// Parse a filter pattern
    pub fn parse(filter: &str) -> Result<Self> {
        let (vid, pid) = filter
            .split_once(':')
            .filter(|(_, pid)| !pid.contains(':'))
            .ok_or_else(|| {
                anyhow!(
                    "Invalid filter '{}', expected VID:PID such as '0x046d:0xc52b' or '0x046d:*'",
                    filter
                )
            })?;

        Ok(Self {
            vendor_id: parse_id(vid, "VID")?,
            product_id: parse_id(pid, "PID")?,
        })
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.is_none_or(|vid| vid == vendor_id)
            && self.product_id.is_none_or(|pid| pid == product_id)
    }
}

/// `*` or `0x` followed by one to four hex digits
fn parse_id(text: &str, name: &str) -> Result<Option<u16>> {
    if text == "*" {
        return Ok(None);
    }

    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("{} '{}' needs a 0x prefix", name, text))?;
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("{} '{}' must be 1 to 4 hex digits after 0x", name, text);
    }

    Ok(Some(u16::from_str_radix(digits, 16)?))
}

/// Check if a device passes the filters
///
/// Hubs always pass so the tree stays connected. An empty filter list lets
/// every device through.
pub fn is_shown(identity: &DeviceIdentity, filters: &[DeviceFilter]) -> bool {
    filters.is_empty()
        || identity.is_hub()
        || filters
            .iter()
            .any(|f| f.matches(identity.vendor_id(), identity.product_id()))
}

/// Drop non-matching leaf devices from a tree
pub fn filter_tree(tree: Vec<TreeNode>, filters: &[DeviceFilter]) -> Vec<TreeNode> {
    tree.into_iter()
        .filter(|node| is_shown(&node.device.identity, filters))
        .map(|node| TreeNode {
            children: filter_tree(node.children, filters),
            ..node
        })
        .collect()
}

pub fn is_event_shown(event: &TopologyEvent, filters: &[DeviceFilter]) -> bool {
    is_shown(event.identity(), filters)
}
