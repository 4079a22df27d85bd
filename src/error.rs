//! Error types for the agrow-probe-ble crate.

use thiserror::Error;

use crate::permissions::Capability;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// A required runtime permission was not granted.
    #[error("Permission denied: {capability}")]
    PermissionDenied {
        /// The capability that was denied.
        capability: Capability,
    },

    /// Scanning could not be started or failed mid-scan.
    #[error("Scan failed: {reason}")]
    ScanFailed {
        /// Description of why the scan failed.
        reason: String,
    },

    /// The specified probe was not found.
    #[error("Probe not found: {identifier}")]
    ProbeNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// Operation requires a connection but no probe is connected.
    #[error("Probe not connected")]
    NotConnected,

    /// Failed to establish a connection to the probe.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The connection attempt exceeded its time budget.
    #[error("Connection timed out after {seconds} seconds")]
    ConnectionTimeout {
        /// The timeout that was exceeded, in seconds.
        seconds: u64,
    },

    /// Subscribing to the soil-data characteristic failed.
    #[error("Subscription failed: {reason}")]
    SubscriptionFailed {
        /// Description of why the subscription failed.
        reason: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// The prediction request could not be completed.
    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The prediction response is missing an expected parameter key.
    #[error("Backend response missing prediction key: {key}")]
    MissingPrediction {
        /// The parameter key that was absent.
        key: &'static str,
    },

    /// The prediction response body could not be interpreted.
    #[error("Invalid backend response: {context}")]
    InvalidResponse {
        /// Description of what was invalid about the response.
        context: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MissingPrediction { key: "zn_ext" };
        assert_eq!(
            err.to_string(),
            "Backend response missing prediction key: zn_ext"
        );

        let err = Error::ConnectionTimeout { seconds: 5 };
        assert!(err.to_string().contains("5 seconds"));
    }

    #[test]
    fn test_permission_denied_display() {
        let err = Error::PermissionDenied {
            capability: Capability::BluetoothScan,
        };
        assert!(err.to_string().contains("bluetooth scan"));
    }
}
