//! usb-topology
//!
//! Prints the tree of USB devices attached to this host, or watches it and
//! prints attach and detach events as devices come and go.

use anyhow::{Context, Result};
use clap::Parser;
use cli::config::AppConfig;
use cli::filter::{DeviceFilter, filter_tree, is_event_shown};
use cli::output::{render_event, render_event_json, render_tree, render_tree_json};
use common::setup_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use topology::DeviceManager;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-topology")]
#[command(author, version, about = "Show the USB device tree of this host")]
#[command(long_about = "
Shows how the USB devices of this host are plugged into each other, the way
`lsusb -t` does, and optionally keeps watching for changes.

EXAMPLES:
    # Print the device tree
    usb-topology

    # Print the device tree as JSON
    usb-topology --json

    # Watch for attach and detach events, scanning every 200 ms
    usb-topology --watch --interval-ms 200

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/usb-topology/config.toml
    3. /etc/usb-topology/config.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Keep scanning and print changes until Ctrl+C
    #[arg(short, long)]
    watch: bool,

    /// Background scan interval in milliseconds
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = AppConfig::default();
        let path = AppConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        AppConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        AppConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);
    common::validate_log_level(log_level)?;
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-topology v{}", env!("CARGO_PKG_VERSION"));

    let filters = config.filters()?;
    let scanner_config = config.scanner_config(args.interval_ms)?;
    let manager =
        Arc::new(DeviceManager::open(scanner_config).context("Failed to initialize USB")?);

    // libusb enumeration blocks, keep it off the async workers
    let initial = Arc::clone(&manager);
    tokio::task::spawn_blocking(move || initial.first_scan())
        .await
        .context("Initial scan task failed")?
        .context("Initial USB scan failed")?;

    print_tree(&manager, &filters, args.json)?;

    if args.watch {
        watch(Arc::clone(&manager), &filters, args.json).await?;
    }

    Ok(())
}

fn print_tree(manager: &DeviceManager, filters: &[DeviceFilter], json: bool) -> Result<()> {
    let tree = filter_tree(manager.tree(), filters);
    if json {
        println!("{}", render_tree_json(&tree)?);
    } else if tree.is_empty() {
        println!("No USB devices found.");
    } else {
        print!("{}", render_tree(&tree));
    }
    Ok(())
}

/// Print topology events until Ctrl+C
async fn watch(manager: Arc<DeviceManager>, filters: &[DeviceFilter], json: bool) -> Result<()> {
    let events = manager.subscribe();
    manager.start().context("Failed to start background scanning")?;
    info!("Watching for USB changes, press Ctrl+C to stop");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Ok(event) = event else {
                    break;
                };
                if !is_event_shown(&event, filters) {
                    continue;
                }
                if json {
                    println!("{}", render_event_json(&event)?);
                } else {
                    println!("{}", render_event(&event));
                }
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down..."),
                    Err(e) => error!("Error waiting for Ctrl+C: {}", e),
                }
                break;
            }
        }
    }

    // Joining the scan thread blocks
    tokio::task::spawn_blocking(move || manager.shutdown())
        .await
        .context("Shutdown task failed")?;

    info!("Shutdown complete");
    Ok(())
}
