//! BLE connection management.
//!
//! Owns the single active [`ConnectionSession`]: at most one probe is
//! connected at any time, and starting a new session tears the previous one
//! down (sampler stopped, subscription released, link cancelled) before the
//! new link is established.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::backend::BatchDispatcher;
use crate::ble::radio::{BleRadio, ProbeLink};
use crate::ble::scanner::DiscoveredProbe;
use crate::ble::uuids::SOIL_DATA_CHARACTERISTIC_UUID;
use crate::data::SoilDataStore;
use crate::error::{Error, Result};
use crate::sampler::{spawn_sampler, SamplerHandle};

/// Upper bound on link establishment time.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state for the active probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected to any probe.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// Identifier of the probe the transition concerns.
    pub identifier: String,
    /// The new connection state.
    pub state: ConnectionState,
}

/// One physical connection: the link, its notification sampler, and the
/// session epoch used to discard results that outlive the session.
struct ConnectionSession {
    probe: DiscoveredProbe,
    link: Arc<dyn ProbeLink>,
    sampler: SamplerHandle,
    epoch: u64,
}

/// Manages the single active connection to a soil probe.
pub struct ConnectionManager {
    radio: Arc<dyn BleRadio>,
    dispatcher: Arc<dyn BatchDispatcher>,
    store: Arc<SoilDataStore>,
    session: Arc<Mutex<Option<ConnectionSession>>>,
    state: Arc<RwLock<ConnectionState>>,
    active_probe: Arc<RwLock<Option<DiscoveredProbe>>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    epoch: AtomicU64,
    closed_tx: mpsc::UnboundedSender<u64>,
    reaper_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a connection manager wiring completed batches to the
    /// dispatcher and validated results to the store.
    pub fn new(
        radio: Arc<dyn BleRadio>,
        dispatcher: Arc<dyn BatchDispatcher>,
        store: Arc<SoilDataStore>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();

        let manager = Self {
            radio,
            dispatcher,
            store,
            session: Arc::new(Mutex::new(None)),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            active_probe: Arc::new(RwLock::new(None)),
            event_tx,
            epoch: AtomicU64::new(0),
            closed_tx,
            reaper_handle: RwLock::new(None),
        };

        *manager.reaper_handle.write() = Some(manager.spawn_reaper(closed_rx));
        manager
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The currently connected probe, if any.
    pub fn active_probe(&self) -> Option<DiscoveredProbe> {
        self.active_probe.read().clone()
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Whether the active session has a backend dispatch pending.
    pub async fn is_dispatch_in_flight(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.sampler.is_dispatch_in_flight())
            .unwrap_or(false)
    }

    /// Connect to a discovered probe.
    ///
    /// Connecting to the probe that is already active returns the existing
    /// handle without touching the link. Connecting to a different probe
    /// first tears down the current session. The attempt is bounded by
    /// [`CONNECT_TIMEOUT`]; the connection is only usable once full service
    /// discovery and the notification subscription have succeeded.
    pub async fn connect(&self, probe: DiscoveredProbe) -> Result<DiscoveredProbe> {
        let mut session = self.session.lock().await;

        if let Some(current) = session.take() {
            if current.probe.identifier == probe.identifier {
                debug!("Probe already connected: {}", probe.identifier);
                let handle = current.probe.clone();
                *session = Some(current);
                return Ok(handle);
            }

            info!(
                "Superseding connection {} with {}",
                current.probe.identifier, probe.identifier
            );
            self.set_state(&current.probe.identifier, ConnectionState::Disconnecting);
            Self::teardown(current).await;
            *self.active_probe.write() = None;
            self.set_state(&probe.identifier, ConnectionState::Disconnected);
        }

        info!("Connecting to probe {}", probe.identifier);
        self.set_state(&probe.identifier, ConnectionState::Connecting);

        let link = match tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.radio.connect(&probe.identifier),
        )
        .await
        {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                warn!("Connection to {} failed: {}", probe.identifier, e);
                self.set_state(&probe.identifier, ConnectionState::Disconnected);
                return Err(e);
            }
            Err(_) => {
                warn!("Connection to {} timed out", probe.identifier);
                self.set_state(&probe.identifier, ConnectionState::Disconnected);
                return Err(Error::ConnectionTimeout {
                    seconds: CONNECT_TIMEOUT.as_secs(),
                });
            }
        };

        // No partially-ready connection: discovery failure cancels the link.
        if let Err(e) = link.discover_services().await {
            warn!("Service discovery failed for {}: {}", probe.identifier, e);
            let _ = link.disconnect().await;
            self.set_state(&probe.identifier, ConnectionState::Disconnected);
            return Err(Error::ConnectionFailed {
                reason: format!("service discovery failed: {e}"),
            });
        }

        // Identification string lives on the same characteristic as the
        // notification stream. Not required for operation.
        match link.read(SOIL_DATA_CHARACTERISTIC_UUID).await {
            Ok(data) => match String::from_utf8(data) {
                Ok(identification) => {
                    info!("Probe identification: {}", identification.trim());
                }
                Err(_) => warn!("Probe identification is not valid UTF-8"),
            },
            Err(e) => warn!("Failed to read probe identification: {}", e),
        }

        let notifications = match link.subscribe(SOIL_DATA_CHARACTERISTIC_UUID).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Subscription failed for {}: {}", probe.identifier, e);
                let _ = link.disconnect().await;
                self.set_state(&probe.identifier, ConnectionState::Disconnected);
                return Err(Error::SubscriptionFailed {
                    reason: e.to_string(),
                });
            }
        };

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let sampler = spawn_sampler(
            notifications,
            self.dispatcher.clone(),
            self.store.clone(),
            self.closed_tx.clone(),
            epoch,
        );

        *session = Some(ConnectionSession {
            probe: probe.clone(),
            link,
            sampler,
            epoch,
        });
        *self.active_probe.write() = Some(probe.clone());
        self.set_state(&probe.identifier, ConnectionState::Connected);

        info!("Connected to probe {}", probe.identifier);

        Ok(probe)
    }

    /// Disconnect the active probe. A safe no-op when nothing is connected.
    pub async fn disconnect(&self) -> Result<()> {
        let mut session = self.session.lock().await;

        let Some(current) = session.take() else {
            debug!("No active connection, ignoring disconnect");
            return Ok(());
        };

        info!("Disconnecting from probe {}", current.probe.identifier);

        let identifier = current.probe.identifier.clone();
        self.set_state(&identifier, ConnectionState::Disconnecting);
        Self::teardown(current).await;
        *self.active_probe.write() = None;
        self.set_state(&identifier, ConnectionState::Disconnected);

        Ok(())
    }

    /// Release a session: stop the sampler, drop the subscription, cancel
    /// the link. Failures are logged; teardown always completes.
    async fn teardown(session: ConnectionSession) {
        session.sampler.shutdown();

        if let Err(e) = session
            .link
            .unsubscribe(SOIL_DATA_CHARACTERISTIC_UUID)
            .await
        {
            debug!("Unsubscribe failed during teardown: {}", e);
        }

        if let Err(e) = session.link.disconnect().await {
            warn!("Link cancel failed during teardown: {}", e);
        }
    }

    /// Reap sessions whose notification stream ended on its own
    /// (peripheral-initiated link loss).
    fn spawn_reaper(
        &self,
        mut closed_rx: mpsc::UnboundedReceiver<u64>,
    ) -> tokio::task::JoinHandle<()> {
        let session = self.session.clone();
        let state = self.state.clone();
        let active_probe = self.active_probe.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            while let Some(epoch) = closed_rx.recv().await {
                let mut guard = session.lock().await;

                match guard.take() {
                    Some(current) if current.epoch == epoch => {
                        info!(
                            "Link to {} lost, releasing session",
                            current.probe.identifier
                        );

                        let identifier = current.probe.identifier.clone();
                        Self::teardown(current).await;
                        *active_probe.write() = None;
                        *state.write() = ConnectionState::Disconnected;
                        let _ = event_tx.send(ConnectionEvent {
                            identifier,
                            state: ConnectionState::Disconnected,
                        });
                    }
                    other => {
                        debug!("Ignoring stale link-loss signal for session {}", epoch);
                        *guard = other;
                    }
                }
            }
        })
    }

    /// Update the connection state and emit an event.
    fn set_state(&self, identifier: &str, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);

            let _ = self.event_tx.send(ConnectionEvent {
                identifier: identifier.to_string(),
                state: new_state,
            });
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.reaper_handle.write().take() {
            handle.abort();
        }
    }
}
