//! Device manager tying the acquisition pipeline together.
//!
//! Owns the permission gate, the scanner, the connection manager, and the
//! soil-data store. Host applications drive the pipeline through this facade
//! and read results from the store.

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::{BatchDispatcher, PredictionClient};
use crate::ble::radio::BleRadio;
use crate::ble::scanner::{DiscoveredProbe, ProbeScanner};
use crate::ble::{BtleplugRadio, ConnectionManager, ConnectionState};
use crate::data::SoilDataStore;
use crate::error::{Error, Result};
use crate::permissions::{Capability, PermissionBroker, PermissionGate, PreGranted};

/// Central manager for discovering and connecting to soil probes.
pub struct DeviceManager {
    permissions: PermissionGate,
    scanner: Arc<ProbeScanner>,
    connection: Arc<ConnectionManager>,
    store: Arc<SoilDataStore>,
}

impl DeviceManager {
    /// Create a device manager on the platform Bluetooth adapter, posting
    /// batches to the given prediction endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(prediction_endpoint: impl Into<String>) -> Result<Self> {
        let radio: Arc<dyn BleRadio> = Arc::new(BtleplugRadio::new().await?);
        let dispatcher: Arc<dyn BatchDispatcher> =
            Arc::new(PredictionClient::new(prediction_endpoint));

        Ok(Self::with_parts(
            radio,
            Arc::new(PreGranted),
            dispatcher,
            Arc::new(SoilDataStore::new()),
        ))
    }

    /// Assemble a device manager from explicit parts. Used by tests and by
    /// hosts that supply their own radio, permission broker, or backend.
    pub fn with_parts(
        radio: Arc<dyn BleRadio>,
        broker: Arc<dyn PermissionBroker>,
        dispatcher: Arc<dyn BatchDispatcher>,
        store: Arc<SoilDataStore>,
    ) -> Self {
        let scanner = Arc::new(ProbeScanner::new(radio.clone()));
        let connection = Arc::new(ConnectionManager::new(radio, dispatcher, store.clone()));

        Self {
            permissions: PermissionGate::new(broker),
            scanner,
            connection,
            store,
        }
    }

    /// Start scanning for probes. Checks runtime permissions first and
    /// fails with [`Error::PermissionDenied`] if any capability is refused.
    pub async fn start_scan(&self) -> Result<()> {
        if !self.permissions.ensure_permissions().await {
            let capability = self
                .permissions
                .denied()
                .first()
                .copied()
                .unwrap_or(Capability::BluetoothScan);
            warn!("Scan blocked, permission denied: {}", capability);
            return Err(Error::PermissionDenied { capability });
        }

        self.scanner.start_scan().await
    }

    /// Stop scanning. Idempotent.
    pub async fn stop_scan(&self) -> Result<()> {
        self.scanner.stop_scan().await
    }

    /// Check if scanning is active.
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// All probes discovered by the current or most recent scan.
    pub fn discovered_probes(&self) -> Vec<DiscoveredProbe> {
        self.scanner.discovered_probes().into_values().collect()
    }

    /// Connect to a previously discovered probe by identifier.
    pub async fn connect(&self, identifier: &str) -> Result<DiscoveredProbe> {
        let probe = self
            .scanner
            .get_probe(identifier)
            .ok_or_else(|| Error::ProbeNotFound {
                identifier: identifier.to_string(),
            })?;

        self.connection.connect(probe).await
    }

    /// Disconnect the active probe. Safe no-op when nothing is connected.
    pub async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The currently connected probe, if any.
    pub fn connected_probe(&self) -> Option<DiscoveredProbe> {
        self.connection.active_probe()
    }

    /// The shared soil-data store the UI reads from.
    pub fn store(&self) -> Arc<SoilDataStore> {
        self.store.clone()
    }

    /// The permission gate, for subscribing to denial guidance.
    pub fn permissions(&self) -> &PermissionGate {
        &self.permissions
    }

    /// The scanner, for discovery event subscriptions.
    pub fn scanner(&self) -> &ProbeScanner {
        &self.scanner
    }

    /// The connection manager, for state event subscriptions.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Clean shutdown: stop scanning and release any active connection.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down device manager");

        self.stop_scan().await?;
        self.disconnect().await?;

        Ok(())
    }
}
