//! USB link speed

use serde::{Deserialize, Serialize};
use std::fmt;

/// USB device speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceSpeed {
    /// Speed not reported by the host stack
    #[default]
    Unknown,
    /// Low speed - 1.5 Mbps (USB 1.0)
    Low,
    /// Full speed - 12 Mbps (USB 1.1)
    Full,
    /// High speed - 480 Mbps (USB 2.0)
    High,
    /// SuperSpeed - 5 Gbps (USB 3.0)
    Super,
    /// SuperSpeed+ - 10 Gbps (USB 3.1)
    SuperPlus,
}

impl From<rusb::Speed> for DeviceSpeed {
    fn from(speed: rusb::Speed) -> Self {
        match speed {
            rusb::Speed::Low => DeviceSpeed::Low,
            rusb::Speed::Full => DeviceSpeed::Full,
            rusb::Speed::High => DeviceSpeed::High,
            rusb::Speed::Super => DeviceSpeed::Super,
            rusb::Speed::SuperPlus => DeviceSpeed::SuperPlus,
            _ => DeviceSpeed::Unknown,
        }
    }
}

impl fmt::Display for DeviceSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceSpeed::Unknown => "unknown",
            DeviceSpeed::Low => "1.5M",
            DeviceSpeed::Full => "12M",
            DeviceSpeed::High => "480M",
            DeviceSpeed::Super => "5000M",
            DeviceSpeed::SuperPlus => "10000M",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_device_speed() {
        assert_eq!(DeviceSpeed::from(rusb::Speed::Low), DeviceSpeed::Low);
        assert_eq!(DeviceSpeed::from(rusb::Speed::Full), DeviceSpeed::Full);
        assert_eq!(DeviceSpeed::from(rusb::Speed::High), DeviceSpeed::High);
        assert_eq!(DeviceSpeed::from(rusb::Speed::Super), DeviceSpeed::Super);
        assert_eq!(
            DeviceSpeed::from(rusb::Speed::SuperPlus),
            DeviceSpeed::SuperPlus
        );
        assert_eq!(DeviceSpeed::from(rusb::Speed::Unknown), DeviceSpeed::Unknown);
    }

    #[test]
    fn test_display_matches_lsusb() {
        assert_eq!(DeviceSpeed::High.to_string(), "480M");
        assert_eq!(DeviceSpeed::Unknown.to_string(), "unknown");
    }
}
