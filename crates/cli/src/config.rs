//! CLI configuration management

use crate::filter::DeviceFilter;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use topology::{DEFAULT_SCAN_INTERVAL_MS, ScannerConfig};

/// Shortest accepted background scan interval
pub const MIN_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralSettings,
    #[serde(default)]
    pub scanner: ScannerSettings,
    /// Devices shown in the tree and event output
    #[serde(default)]
    pub display: DisplaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerSettings {
    /// Background scan interval in milliseconds
    #[serde(default = "ScannerSettings::default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            interval_ms: Self::default_interval_ms(),
        }
    }
}

impl ScannerSettings {
    fn default_interval_ms() -> u64 {
        DEFAULT_SCAN_INTERVAL_MS
    }
}

/// Display filtering
///
/// # Example Configuration
/// ```toml
/// [display]
/// filters = ["0x046d:*", "0x1234:0x5678"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// VID:PID filters, empty shows every device
    #[serde(default)]
    pub filters: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralSettings {
                log_level: "info".to_string(),
            },
            scanner: ScannerSettings::default(),
            display: DisplaySettings::default(),
        }
    }
}

/// System-wide configuration, read when there is no per-user file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/usb-topology/config.toml";

impl AppConfig {
    /// Load and validate a configuration file
    ///
    /// Without an explicit path the per-user file is tried first, then
    /// [`SYSTEM_CONFIG_PATH`].
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = locate(path)?;
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        tracing::info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load) without a path, falling back to defaults
    pub fn load_or_default() -> Self {
        Self::load(None).unwrap_or_else(|e| {
            tracing::warn!("{:#}, using built-in defaults", e);
            Self::default()
        })
    }

    /// Write the configuration, creating missing directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let path = expand_path(path);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let text = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(&path, text)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Per-user configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("usb-topology")
            .join("config.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        common::validate_log_level(&self.general.log_level)?;
        Self::validate_interval(self.scanner.interval_ms)?;
        self.filters()?;
        Ok(())
    }

    fn validate_interval(interval_ms: u64) -> Result<()> {
        if interval_ms < MIN_INTERVAL_MS {
            return Err(anyhow!(
                "Invalid scan interval {} ms, must be at least {} ms",
                interval_ms,
                MIN_INTERVAL_MS
            ));
        }
        Ok(())
    }

    /// Parsed display filters
    pub fn filters(&self) -> Result<Vec<DeviceFilter>> {
        self.display
            .filters
            .iter()
            .map(|f| DeviceFilter::parse(f))
            .collect()
    }

    /// Scanner settings, with an optional interval override
    pub fn scanner_config(&self, interval_ms: Option<u64>) -> Result<ScannerConfig> {
        let interval_ms = interval_ms.unwrap_or(self.scanner.interval_ms);
        Self::validate_interval(interval_ms)?;
        Ok(ScannerConfig::with_interval(Duration::from_millis(
            interval_ms,
        )))
    }
}

/// Resolve the configuration file to read
fn locate(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand_path(&path)),
        None => [AppConfig::default_path(), PathBuf::from(SYSTEM_CONFIG_PATH)]
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| anyhow!("No configuration file found")),
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
