//! BLE transport configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE central transport
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BleTransportConfig {
    /// Index into the adapters reported by the platform
    pub adapter_index: usize,
    /// Maximum number of discoveries grouped into one scan batch
    pub scan_batch_size: usize,
    /// Largest single characteristic write (conservative BLE MTU)
    pub write_chunk_size: usize,
    /// Use acknowledged writes instead of write-without-response
    pub write_with_response: bool,
    /// Upper bound on GATT service discovery after connecting
    pub service_discovery_timeout_ms: u64,
}

impl Default for BleTransportConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            scan_batch_size: 8,
            write_chunk_size: 244,
            write_with_response: false,
            service_discovery_timeout_ms: 10_000,
        }
    }
}

impl BleTransportConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the adapter to use
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Set scan batch size
    pub fn with_scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size;
        self
    }

    /// Set write chunk size
    pub fn with_write_chunk_size(mut self, size: usize) -> Self {
        self.write_chunk_size = size;
        self
    }

    /// Enable or disable acknowledged writes
    pub fn with_write_with_response(mut self, enabled: bool) -> Self {
        self.write_with_response = enabled;
        self
    }

    pub fn service_discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.service_discovery_timeout_ms)
    }

    /// Check the values the transport relies on
    pub fn validate(&self) -> Result<(), String> {
        if self.scan_batch_size == 0 {
            return Err("scan_batch_size must be at least 1".to_string());
        }
        if self.write_chunk_size == 0 {
            return Err("write_chunk_size must be at least 1".to_string());
        }
        if self.service_discovery_timeout_ms == 0 {
            return Err("service_discovery_timeout_ms must be non-zero".to_string());
        }
        Ok(())
    }
}
