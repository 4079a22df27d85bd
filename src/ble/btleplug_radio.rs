//! btleplug-backed implementation of the radio abstraction.
//!
//! Owns the platform adapter and the peripherals it has seen. The adapter is
//! an explicitly constructed resource with its lifetime tied to the radio
//! value, not ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::ble::radio::{Advertisement, AdvertisementStream, BleRadio, NotificationStream, ProbeLink};
use crate::error::{Error, Result};

/// Production radio over the platform's first Bluetooth adapter.
pub struct BtleplugRadio {
    adapter: Adapter,
    /// Peripherals observed by any advertisement stream, by identifier.
    seen: Arc<RwLock<HashMap<String, Peripheral>>>,
}

impl BtleplugRadio {
    /// Create a radio on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BluetoothUnavailable`] if no adapter is present.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self {
            adapter,
            seen: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Create a radio with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            seen: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn peripheral_by_identifier(&self, identifier: &str) -> Result<Peripheral> {
        if let Some(peripheral) = self.seen.read().get(identifier).cloned() {
            return Ok(peripheral);
        }

        // Not seen by a scan this session; fall back to the adapter's list.
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;
        peripherals
            .into_iter()
            .find(|p| p.id().to_string() == identifier)
            .ok_or_else(|| Error::ProbeNotFound {
                identifier: identifier.to_string(),
            })
    }
}

#[async_trait]
impl BleRadio for BtleplugRadio {
    async fn start_scan(&self) -> Result<()> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)
    }

    async fn advertisements(&self) -> Result<AdvertisementStream> {
        let events = self.adapter.events().await.map_err(Error::Bluetooth)?;
        let adapter = self.adapter.clone();
        let seen = self.seen.clone();

        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            let seen = seen.clone();

            async move {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => return None,
                };

                let peripheral = match adapter.peripheral(&id).await {
                    Ok(p) => p,
                    Err(e) => {
                        trace!("Failed to get peripheral: {}", e);
                        return None;
                    }
                };

                let properties = match peripheral.properties().await {
                    Ok(Some(p)) => p,
                    _ => return None,
                };

                let identifier = id.to_string();
                seen.write().insert(identifier.clone(), peripheral);

                Some(Ok(Advertisement {
                    identifier,
                    local_name: properties.local_name,
                    rssi: properties.rssi,
                }))
            }
        });

        Ok(stream.boxed())
    }

    async fn connect(&self, identifier: &str) -> Result<Arc<dyn ProbeLink>> {
        let peripheral = self.peripheral_by_identifier(identifier).await?;

        if !peripheral.is_connected().await.unwrap_or(false) {
            peripheral.connect().await.map_err(Error::Bluetooth)?;
        } else {
            debug!("Peripheral already connected at BLE level");
        }

        Ok(Arc::new(BtleplugLink {
            identifier: identifier.to_string(),
            peripheral,
            characteristics: RwLock::new(HashMap::new()),
        }))
    }
}

/// A link over one btleplug peripheral.
struct BtleplugLink {
    identifier: String,
    peripheral: Peripheral,
    /// Cached characteristics by UUID, filled by `discover_services`.
    characteristics: RwLock<HashMap<Uuid, Characteristic>>,
}

impl BtleplugLink {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }
}

#[async_trait]
impl ProbeLink for BtleplugLink {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn discover_services(&self) -> Result<()> {
        self.peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)?;

        let mut chars = self.characteristics.write();
        chars.clear();

        for service in self.peripheral.services() {
            for characteristic in service.characteristics {
                debug!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid, service.uuid
                );
                chars.insert(characteristic.uuid, characteristic);
            }
        }

        debug!("Discovered {} characteristics", chars.len());

        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.characteristic(characteristic)?;

        let data = self
            .peripheral
            .read(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Read {} bytes from characteristic {}", data.len(), characteristic.uuid);

        Ok(data)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream> {
        let uuid = characteristic;
        let characteristic = self.characteristic(uuid)?;

        self.peripheral
            .subscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Subscribed to notifications from {}", uuid);

        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(Error::Bluetooth)?;

        let stream = notifications.filter_map(move |notification| async move {
            if notification.uuid == uuid {
                Some(notification.value)
            } else {
                None
            }
        });

        Ok(stream.boxed())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()> {
        let characteristic = self.characteristic(characteristic)?;

        self.peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Unsubscribed from notifications from {}", characteristic.uuid);

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await.map_err(Error::Bluetooth)
    }
}
