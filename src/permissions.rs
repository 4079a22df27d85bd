//! Runtime permission gating for BLE operations.
//!
//! On platforms with runtime permission models (Android in particular) the
//! radio cannot be used until scan, connect, and location capabilities have
//! all been granted. The [`PermissionGate`] checks and requests each one
//! individually and reports denials with a deep link to the system settings
//! so a host application can guide the user there.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// A runtime capability required before scanning or connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Permission to scan for nearby BLE peripherals.
    BluetoothScan,
    /// Permission to connect to a BLE peripheral.
    BluetoothConnect,
    /// Fine-grained location access (required for scanning on some platforms).
    FineLocation,
    /// Coarse location access.
    CoarseLocation,
}

impl Capability {
    /// All capabilities the acquisition pipeline requires.
    pub const ALL: [Capability; 4] = [
        Capability::BluetoothScan,
        Capability::BluetoothConnect,
        Capability::FineLocation,
        Capability::CoarseLocation,
    ];
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BluetoothScan => write!(f, "bluetooth scan"),
            Self::BluetoothConnect => write!(f, "bluetooth connect"),
            Self::FineLocation => write!(f, "fine location"),
            Self::CoarseLocation => write!(f, "coarse location"),
        }
    }
}

/// Guidance emitted when a capability ends up denied.
///
/// Hosts surface this to the user together with the settings deep link.
#[derive(Debug, Clone)]
pub struct PermissionGuidance {
    /// The capability that was denied.
    pub capability: Capability,
    /// Deep link to the relevant system settings screen.
    pub settings_url: String,
}

/// Platform hook for checking and requesting runtime permissions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionBroker: Send + Sync {
    /// Check whether a capability is already granted.
    fn is_granted(&self, capability: Capability) -> bool;

    /// Request a capability from the user. Returns the resulting grant state.
    async fn request(&self, capability: Capability) -> bool;

    /// Deep link to the system settings screen for this app.
    fn settings_url(&self) -> String;
}

/// Broker for platforms without a runtime permission model.
///
/// Desktop targets (BlueZ, CoreBluetooth, WinRT) grant BLE access at install
/// or OS-preference level, so every capability reports granted.
#[derive(Debug, Default)]
pub struct PreGranted;

#[async_trait]
impl PermissionBroker for PreGranted {
    fn is_granted(&self, _capability: Capability) -> bool {
        true
    }

    async fn request(&self, _capability: Capability) -> bool {
        true
    }

    fn settings_url(&self) -> String {
        String::new()
    }
}

/// Checks all required capabilities before the radio is touched.
pub struct PermissionGate {
    broker: Arc<dyn PermissionBroker>,
    guidance_tx: broadcast::Sender<PermissionGuidance>,
    denied: parking_lot::RwLock<Vec<Capability>>,
}

impl PermissionGate {
    /// Create a gate over a platform broker.
    pub fn new(broker: Arc<dyn PermissionBroker>) -> Self {
        let (guidance_tx, _) = broadcast::channel(16);

        Self {
            broker,
            guidance_tx,
            denied: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// Ensure every required capability is granted, requesting any that are
    /// not. Returns true only if all of them end up granted.
    ///
    /// Safe to call before every scan; already-granted capabilities are not
    /// re-requested.
    pub async fn ensure_permissions(&self) -> bool {
        let mut denied = Vec::new();

        for capability in Capability::ALL {
            if self.broker.is_granted(capability) {
                debug!("Capability already granted: {}", capability);
                continue;
            }

            if self.broker.request(capability).await {
                debug!("Capability granted on request: {}", capability);
                continue;
            }

            warn!("Capability denied: {}", capability);
            denied.push(capability);

            let _ = self.guidance_tx.send(PermissionGuidance {
                capability,
                settings_url: self.broker.settings_url(),
            });
        }

        let all_granted = denied.is_empty();
        *self.denied.write() = denied;
        all_granted
    }

    /// Capabilities denied by the most recent [`ensure_permissions`] pass.
    ///
    /// [`ensure_permissions`]: Self::ensure_permissions
    pub fn denied(&self) -> Vec<Capability> {
        self.denied.read().clone()
    }

    /// Subscribe to denial guidance events.
    pub fn subscribe_guidance(&self) -> broadcast::Receiver<PermissionGuidance> {
        self.guidance_tx.subscribe()
    }
}
