//! BLE scanning functionality.
//!
//! Discovers nearby soil probes. Advertisements without a usable display
//! name cannot be shown or selected, so they never enter the discovered set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ble::radio::{Advertisement, BleRadio};
use crate::error::Result;

/// Hard scan window. The radio is stopped when this elapses even if the
/// caller never invokes [`ProbeScanner::stop_scan`].
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(15);

/// A peripheral discovered during scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredProbe {
    /// Stable peripheral identifier. Unique within the discovered set.
    pub identifier: String,
    /// Advertised display name. Never empty.
    pub name: String,
    /// Signal strength in dBm from the latest advertisement.
    pub rssi: Option<i16>,
}

/// Scanner for discovering soil probes.
pub struct ProbeScanner {
    radio: Arc<dyn BleRadio>,
    /// Whether scanning is currently active.
    is_scanning: Arc<RwLock<bool>>,
    /// Discovered peripherals by identifier.
    discovered: Arc<RwLock<HashMap<String, DiscoveredProbe>>>,
    /// Most recent scan error, if any.
    last_error: Arc<RwLock<Option<String>>>,
    /// Channel for discovery events.
    event_tx: broadcast::Sender<DiscoveredProbe>,
    /// Handle to the scanning task.
    scan_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl ProbeScanner {
    /// Create a scanner over a radio.
    pub fn new(radio: Arc<dyn BleRadio>) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            radio,
            is_scanning: Arc::new(RwLock::new(false)),
            discovered: Arc::new(RwLock::new(HashMap::new())),
            last_error: Arc::new(RwLock::new(None)),
            event_tx,
            scan_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Start scanning for probes.
    ///
    /// No-op if a scan is already running. Clears the discovered set and the
    /// last scan error before listening for advertisements.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio scan cannot be started.
    pub async fn start_scan(&self) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan for soil probes");

        self.discovered.write().clear();
        *self.last_error.write() = None;

        self.radio.start_scan().await?;
        let advertisements = match self.radio.advertisements().await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = self.radio.stop_scan().await;
                return Err(e);
            }
        };

        *self.is_scanning.write() = true;

        let radio = self.radio.clone();
        let is_scanning = self.is_scanning.clone();
        let discovered = self.discovered.clone();
        let last_error = self.last_error.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let mut advertisements = advertisements;
            let timeout = tokio::time::sleep(SCAN_TIMEOUT);
            tokio::pin!(timeout);

            loop {
                if !*is_scanning.read() {
                    break;
                }

                tokio::select! {
                    event = advertisements.next() => {
                        match event {
                            Some(Ok(advertisement)) => {
                                Self::handle_advertisement(
                                    advertisement,
                                    &discovered,
                                    &event_tx,
                                );
                            }
                            Some(Err(e)) => {
                                // Scan failure: back to idle, discovered
                                // list is preserved.
                                warn!("Scan error: {}", e);
                                *last_error.write() = Some(e.to_string());
                                *is_scanning.write() = false;
                                let _ = radio.stop_scan().await;
                                break;
                            }
                            None => {
                                debug!("Advertisement stream ended");
                                *is_scanning.write() = false;
                                break;
                            }
                        }
                    }
                    _ = &mut timeout => {
                        info!("Scan timed out after {:?}", SCAN_TIMEOUT);
                        *is_scanning.write() = false;
                        let _ = radio.stop_scan().await;
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        // Check if we should stop scanning
                        if !*is_scanning.read() {
                            break;
                        }
                    }
                }
            }

            debug!("Scan event loop ended");
        });

        *self.scan_handle.write() = Some(handle);

        Ok(())
    }

    /// Stop scanning for probes. Idempotent; safe to call from Idle.
    pub async fn stop_scan(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        *self.is_scanning.write() = false;

        self.radio.stop_scan().await?;

        if let Some(handle) = self.scan_handle.write().take() {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.read()
    }

    /// Get all discovered probes.
    pub fn discovered_probes(&self) -> HashMap<String, DiscoveredProbe> {
        self.discovered.read().clone()
    }

    /// Get a discovered probe by identifier.
    pub fn get_probe(&self, identifier: &str) -> Option<DiscoveredProbe> {
        self.discovered.read().get(identifier).cloned()
    }

    /// The most recent scan error, if any. Cleared when a scan starts.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Subscribe to discovery events.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveredProbe> {
        self.event_tx.subscribe()
    }

    /// Merge one advertisement into the discovered set.
    ///
    /// Advertisements without a non-empty name are dropped. A repeated
    /// identifier replaces the existing entry; the latest name and signal
    /// win.
    fn handle_advertisement(
        advertisement: Advertisement,
        discovered: &Arc<RwLock<HashMap<String, DiscoveredProbe>>>,
        event_tx: &broadcast::Sender<DiscoveredProbe>,
    ) {
        let name = match advertisement.local_name {
            Some(name) if !name.is_empty() => name,
            _ => return,
        };

        let probe = DiscoveredProbe {
            identifier: advertisement.identifier.clone(),
            name,
            rssi: advertisement.rssi,
        };

        discovered
            .write()
            .insert(advertisement.identifier, probe.clone());

        let _ = event_tx.send(probe);
    }
}

impl Drop for ProbeScanner {
    fn drop(&mut self) {
        *self.is_scanning.write() = false;
    }
}
