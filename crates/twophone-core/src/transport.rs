//! Transport abstraction for the companion link
//!
//! The core never talks to a radio directly. A [`Transport`] exposes the small
//! capability set a central needs: filtered scanning, connect/disconnect,
//! characteristic writes and a byte stream of characteristic notifications.

use async_trait::async_trait;
use futures::stream::BoxStream;
use smallvec::SmallVec;
use uuid::Uuid;

use crate::errors::TransportError;
use crate::types::{DeviceId, DiscoveredDevice};

// ----------------------------------------------------------------------------
// Stream Types
// ----------------------------------------------------------------------------

/// One batch of scan results (usually small)
pub type ScanBatch = SmallVec<[DiscoveredDevice; 8]>;

/// Scan results, one batch per item; ends when the scan stops
pub type ScanStream = BoxStream<'static, ScanBatch>;

/// Raw notification chunks from one characteristic; ends on link loss
pub type ByteStream = BoxStream<'static, Vec<u8>>;

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Radio capability set consumed by sessions and the orchestrator
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin scanning for peripherals advertising `service`
    async fn scan(&self, service: Uuid) -> Result<ScanStream, TransportError>;

    /// Stop an active scan; stopping an idle scanner is not an error
    async fn stop_scan(&self) -> Result<(), TransportError>;

    /// Establish a link to a previously discovered device
    async fn connect(&self, device: &DeviceId) -> Result<(), TransportError>;

    /// Tear down the link; disconnecting an unknown device is not an error
    async fn disconnect(&self, device: &DeviceId) -> Result<(), TransportError>;

    /// Write `bytes` to `characteristic`, resolving once the write is flushed
    async fn write(
        &self,
        device: &DeviceId,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> Result<(), TransportError>;

    /// Subscribe to notifications on `characteristic`
    async fn subscribe_notifications(
        &self,
        device: &DeviceId,
        characteristic: Uuid,
    ) -> Result<ByteStream, TransportError>;
}
