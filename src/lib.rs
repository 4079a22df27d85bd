// Allow holding locks across await points - we use parking_lot which is designed for this
#![allow(clippy::await_holding_lock)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # agrow-probe-ble
//!
//! A cross-platform Rust library for acquiring soil readings from Agrow
//! soil-analysis probes via Bluetooth Low Energy and turning them into
//! predicted soil metrics.
//!
//! The pipeline: discover probes, connect to one, buffer its notification
//! stream into fixed-size sample batches, post each batch to a remote
//! prediction service, and publish the decoded nutrient/texture/water
//! records to a shared store the UI layer reads.
//!
//! ## Features
//!
//! - **Probe Discovery**: Scan for nearby soil probes with a 15-second window
//! - **Single Active Connection**: Exclusive connect/disconnect lifecycle
//! - **Notification Buffering**: 18-sample batches, assembled in arrival order
//! - **Prediction Bridge**: One HTTP POST per batch, all-or-nothing decoding
//!   into the fixed 20-parameter soil record set
//! - **Permission Gating**: Runtime capability checks with settings guidance
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agrow_probe_ble::{DeviceManager, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Create the manager and start scanning
//!     let manager = DeviceManager::new("http://192.168.1.20:5000/predict").await?;
//!     manager.start_scan().await?;
//!
//!     // Wait for probes to be discovered
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     for probe in manager.discovered_probes() {
//!         println!("Found probe: {} ({})", probe.name, probe.identifier);
//!     }
//!
//!     // Connect to the first probe; predictions land in the store
//!     if let Some(probe) = manager.discovered_probes().first() {
//!         manager.connect(&probe.identifier).await?;
//!
//!         let mut updates = manager.store().subscribe();
//!         let records = updates.recv().await.expect("store update");
//!         for record in records {
//!             println!("{}: {} {}", record.label, record.value, record.unit);
//!         }
//!     }
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ### Android and other runtime-permission platforms
//! Supply a [`permissions::PermissionBroker`] implementation backed by the
//! platform permission APIs; the built-in [`permissions::PreGranted`] broker
//! is for desktop targets.

// Public modules
pub mod backend;
pub mod ble;
pub mod data;
pub mod device_manager;
pub mod error;
pub mod permissions;
pub mod sampler;
pub mod utils;

// Re-exports for convenience
pub use device_manager::DeviceManager;
pub use error::{Error, Result};
pub use utils::{kg_ha_to_mg_sample, mg_sample_to_kg_ha};

// Re-export commonly used types from submodules
pub use backend::{BatchDispatcher, PredictionClient};
pub use ble::connection::ConnectionState;
pub use ble::scanner::DiscoveredProbe;
pub use ble::{BleRadio, BtleplugRadio, ProbeLink, UnsupportedRadio};
pub use data::{
    SampleBatch, SoilDataStore, SoilParameterRecord, PARAMETER_COUNT, SAMPLE_BATCH_SIZE,
    SOIL_PARAMETERS,
};
pub use permissions::{Capability, PermissionBroker, PermissionGate, PreGranted};
pub use sampler::{decode_sample, encode_sample, SampleAccumulator};
