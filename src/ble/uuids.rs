//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for soil probe communication.

use uuid::Uuid;

// Generic Access Service (Standard BLE)
/// Standard BLE Generic Access Service UUID.
pub const GENERIC_ACCESS_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1800_0000_1000_8000_00805f9b34fb);
/// Device Name characteristic UUID.
pub const DEVICE_NAME_UUID: Uuid = Uuid::from_u128(0x0000_2a00_0000_1000_8000_00805f9b34fb);

// Soil Analysis Service (Agrow Custom)
/// Agrow Soil Analysis Service UUID.
pub const SOIL_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_abf0_0000_1000_8000_00805f9b34fb);
/// Agrow Soil Data characteristic UUID (Read, Notify).
///
/// A read returns the probe's identification string; notifications carry
/// base64-encoded sensor readings, one ASCII float per notification.
pub const SOIL_DATA_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_abf1_0000_1000_8000_00805f9b34fb);

/// Check if a service UUID is an Agrow-specific service.
pub fn is_soil_service(uuid: &Uuid) -> bool {
    *uuid == SOIL_SERVICE_UUID
}
