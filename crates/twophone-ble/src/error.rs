//! Error types for BLE transport

use thiserror::Error;
use twophone_core::TransportError;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE transport
#[derive(Error, Debug)]
pub enum BleTransportError {
    #[error("Failed to create BLE manager: {0}")]
    ManagerUnavailable(String),

    #[error("BLE adapter {index} not available")]
    AdapterNotAvailable { index: usize },

    #[error("Invalid BLE configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Peripheral not found: {device}")]
    PeripheralNotFound { device: String },

    #[error("Failed to connect to {device}: {reason}")]
    ConnectionFailed { device: String, reason: String },

    #[error("Connection timeout for {device}")]
    ConnectionTimeout { device: String, duration_ms: u64 },

    #[error("Failed to discover services on {device}: {reason}")]
    ServiceDiscoveryFailed { device: String, reason: String },

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: Uuid },

    #[error("Failed to subscribe to notifications from {device}: {reason}")]
    SubscriptionFailed { device: String, reason: String },

    #[error("Failed to write to {device}: {reason}")]
    WriteFailed { device: String, reason: String },

    #[error("Peripheral not connected: {device}")]
    NotConnected { device: String },
}

impl From<BleTransportError> for TransportError {
    fn from(err: BleTransportError) -> Self {
        match err {
            BleTransportError::ManagerUnavailable(_)
            | BleTransportError::AdapterNotAvailable { .. }
            | BleTransportError::InvalidConfiguration(_) => TransportError::AdapterUnavailable,
            BleTransportError::EventStreamFailed(reason) | BleTransportError::ScanFailed(reason) => {
                TransportError::ScanFailed { reason }
            }
            BleTransportError::PeripheralNotFound { device } => {
                TransportError::DeviceNotFound { device }
            }
            BleTransportError::ConnectionFailed { device, reason }
            | BleTransportError::ServiceDiscoveryFailed { device, reason } => {
                TransportError::ConnectionFailed { device, reason }
            }
            BleTransportError::ConnectionTimeout { duration_ms, .. } => {
                TransportError::Timeout { duration_ms }
            }
            BleTransportError::CharacteristicNotFound { characteristic } => {
                TransportError::CharacteristicNotFound { characteristic }
            }
            BleTransportError::SubscriptionFailed { device, reason } => {
                TransportError::SubscriptionFailed { device, reason }
            }
            BleTransportError::WriteFailed { device, reason } => {
                TransportError::WriteFailed { device, reason }
            }
            BleTransportError::NotConnected { device } => TransportError::NotConnected { device },
        }
    }
}
