//! Bluetooth Low Energy transport for the twophone companion link
//!
//! This crate implements the `Transport` trait from `twophone-core` on top of
//! `btleplug` in the central role: it scans for peers advertising the companion
//! service, connects to them, writes frames to the write characteristic and
//! streams notifications from the notify characteristic back to the session.
//!
//! ## Architecture
//!
//! - [`config`] - Transport configuration and settings
//! - [`error`] - Error types specific to BLE transport
//! - [`protocol`] - Advertisement matching and write chunking helpers
//! - [`peer`] - Known peripherals and their notification forwarders
//! - [`discovery`] - Adapter setup and scan batches
//! - [`connection`] - Connect, subscribe, write and disconnect
//! - [`transport`] - `Transport` implementation tying it together
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use twophone_ble::{BleTransport, BleTransportConfig};
//! use twophone_core::{ConnectionOrchestrator, MemoryDeviceStore, OrchestratorConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = BleTransport::new(BleTransportConfig::new().with_write_chunk_size(180)).await?;
//! let handle = ConnectionOrchestrator::spawn(
//!     Arc::new(transport),
//!     Arc::new(MemoryDeviceStore::new()),
//!     OrchestratorConfig::default(),
//! );
//! handle.request_connect("Pixel 8").await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod discovery;
mod error;
mod peer;
mod protocol;
mod transport;

// Public API exports
pub use config::BleTransportConfig;
pub use error::BleTransportError;
pub use protocol::{advertises_service, device_id_for, write_chunks};
pub use transport::BleTransport;

// Re-export Transport trait for convenience
pub use twophone_core::transport::Transport;
