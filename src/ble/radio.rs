//! Radio and link abstractions over the platform BLE stack.
//!
//! The scanner, connection manager, and sampler are written against these
//! traits only. Production code uses the btleplug-backed
//! [`BtleplugRadio`](crate::ble::btleplug_radio::BtleplugRadio); platforms
//! without BLE support get [`UnsupportedRadio`], which fails every operation
//! with [`Error::BluetoothUnavailable`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A single advertisement event observed while scanning.
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Stable peripheral identifier.
    pub identifier: String,
    /// Advertised display name, if any.
    pub local_name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// Stream of advertisement events. An `Err` item reports a scan failure.
pub type AdvertisementStream = BoxStream<'static, Result<Advertisement>>;

/// Stream of raw notification payloads from a subscribed characteristic.
/// Ends when the subscription is released or the link is lost.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// The platform radio: scanning and link establishment.
#[async_trait]
pub trait BleRadio: Send + Sync {
    /// Start the underlying radio scan.
    async fn start_scan(&self) -> Result<()>;

    /// Stop the underlying radio scan.
    async fn stop_scan(&self) -> Result<()>;

    /// Stream of advertisement events for the current scan.
    async fn advertisements(&self) -> Result<AdvertisementStream>;

    /// Establish a link to the peripheral with the given identifier.
    async fn connect(&self, identifier: &str) -> Result<Arc<dyn ProbeLink>>;
}

/// An established link to one peripheral.
#[async_trait]
pub trait ProbeLink: Send + Sync {
    /// The peripheral identifier this link is bound to.
    fn identifier(&self) -> &str;

    /// Discover all services and characteristics. Must complete before the
    /// link is considered usable.
    async fn discover_services(&self) -> Result<()>;

    /// Read the current value of a characteristic.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Subscribe to notifications from a characteristic.
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream>;

    /// Release a notification subscription.
    async fn unsubscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Cancel the link.
    async fn disconnect(&self) -> Result<()>;
}

/// Radio for platforms without a usable BLE stack.
#[derive(Debug, Default)]
pub struct UnsupportedRadio;

#[async_trait]
impl BleRadio for UnsupportedRadio {
    async fn start_scan(&self) -> Result<()> {
        Err(Error::BluetoothUnavailable)
    }

    async fn stop_scan(&self) -> Result<()> {
        Err(Error::BluetoothUnavailable)
    }

    async fn advertisements(&self) -> Result<AdvertisementStream> {
        Err(Error::BluetoothUnavailable)
    }

    async fn connect(&self, _identifier: &str) -> Result<Arc<dyn ProbeLink>> {
        Err(Error::BluetoothUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_radio_fails_every_operation() {
        let radio = UnsupportedRadio;

        assert!(matches!(
            radio.start_scan().await,
            Err(Error::BluetoothUnavailable)
        ));
        assert!(matches!(
            radio.stop_scan().await,
            Err(Error::BluetoothUnavailable)
        ));
        assert!(radio.advertisements().await.is_err());
        assert!(radio.connect("any").await.is_err());
    }
}
