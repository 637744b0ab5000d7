//! Scanner configuration

use std::time::Duration;

/// Default interval between background scans, in milliseconds
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 500;

/// Default interval between background scans
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS);

/// Device manager settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Pause between two background scan passes
    pub scan_interval: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

impl ScannerConfig {
    pub fn with_interval(scan_interval: Duration) -> Self {
        Self { scan_interval }
    }
}
