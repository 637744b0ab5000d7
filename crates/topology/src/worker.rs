//! Background scan thread
//!
//! Dedicated OS thread that runs a scan pass every interval. Scanning uses
//! blocking native calls, so it stays off any async runtime.
//!
//! The inter-scan sleep is a `recv_timeout` on the shutdown channel: a
//! shutdown request (or dropping the [`ScanLoop`]) wakes the thread at once.
//! A pass that is already running is finished before the thread exits.

use crate::error::Result;
use crate::native::UsbEnumerator;
use crate::scanner::TopologyScanner;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Handle on a running background scan thread
pub struct ScanLoop {
    shutdown: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl ScanLoop {
    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop the thread and wait for it to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        // Fails only if the thread already exited
        let _ = self.shutdown.send(());
        if let Err(e) = thread.join() {
            error!("USB scanner thread panicked: {:?}", e);
        }
    }
}

impl Drop for ScanLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the background scan thread
pub fn spawn_scan_loop<E: UsbEnumerator>(
    scanner: Arc<TopologyScanner<E>>,
    interval: Duration,
) -> Result<ScanLoop> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel();

    let thread = std::thread::Builder::new()
        .name("usb-scanner".to_string())
        .spawn(move || run(&scanner, interval, &shutdown_rx))?;

    Ok(ScanLoop {
        shutdown: shutdown_tx,
        thread: Some(thread),
    })
}

fn run<E: UsbEnumerator>(
    scanner: &TopologyScanner<E>,
    interval: Duration,
    shutdown: &mpsc::Receiver<()>,
) {
    info!("USB scanner thread started (interval {:?})", interval);

    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                debug!("USB scanner shutdown requested");
                break;
            }
        }

        // A panicking pass must not take the scanner thread down with it
        let result =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scanner.scan()));

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Background USB scan failed: {}", e),
            Err(e) => error!("Panic in background USB scan: {:?}", e),
        }
    }

    info!("USB scanner thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{DEFAULT_TEST_TIMEOUT, MockBus, MockDevice};
    use std::time::Instant;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + DEFAULT_TEST_TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_loop_picks_up_changes() {
        let bus = MockBus::new();
        let scanner = Arc::new(TopologyScanner::new(bus.clone()));
        let scan_loop = spawn_scan_loop(Arc::clone(&scanner), Duration::from_millis(10)).unwrap();
        assert!(scan_loop.is_running());

        bus.plug(MockDevice::leaf(1, 2, 1, 0x1234, 0x5678));
        assert!(wait_until(|| scanner.len() == 1));

        bus.unplug(1, 2);
        assert!(wait_until(|| scanner.is_empty()));

        scan_loop.shutdown();
    }

    #[test]
    fn test_loop_survives_enumeration_failure() {
        let bus = MockBus::new();
        let scanner = Arc::new(TopologyScanner::new(bus.clone()));
        bus.fail_next_enumeration(rusb::Error::Io);
        let scan_loop = spawn_scan_loop(Arc::clone(&scanner), Duration::from_millis(10)).unwrap();

        bus.plug(MockDevice::leaf(1, 2, 1, 0x1234, 0x5678));
        assert!(wait_until(|| scanner.len() == 1));
        assert!(bus.enumeration_count() >= 2);

        drop(scan_loop);
    }

    #[test]
    fn test_shutdown_interrupts_sleep() {
        let bus = MockBus::new();
        let scanner = Arc::new(TopologyScanner::new(bus.clone()));
        let scan_loop = spawn_scan_loop(scanner, Duration::from_secs(3600)).unwrap();

        let started = Instant::now();
        scan_loop.shutdown();
        assert!(started.elapsed() < DEFAULT_TEST_TIMEOUT);
        assert_eq!(bus.enumeration_count(), 0);
    }
}
