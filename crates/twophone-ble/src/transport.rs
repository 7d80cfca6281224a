//! Main BLE transport implementation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use twophone_core::{ByteStream, DeviceId, ScanStream, Transport, TransportError};
use uuid::Uuid;

use crate::config::BleTransportConfig;
use crate::connection::BleConnection;
use crate::discovery::BleDiscovery;
use crate::error::BleTransportError;
use crate::peer::PeerMap;

// ----------------------------------------------------------------------------
// BLE Transport
// ----------------------------------------------------------------------------

/// Companion-link transport over a BLE adapter in the central role
pub struct BleTransport {
    discovery: BleDiscovery,
    connection: BleConnection,
    peers: PeerMap,
    disconnect_watcher: JoinHandle<()>,
}

impl BleTransport {
    /// Open the configured adapter and start watching for link loss
    pub async fn new(config: BleTransportConfig) -> Result<Self, BleTransportError> {
        config
            .validate()
            .map_err(BleTransportError::InvalidConfiguration)?;

        let peers: PeerMap = Arc::new(RwLock::new(HashMap::new()));
        let discovery = BleDiscovery::initialize(config.clone()).await?;
        let disconnect_watcher = discovery.watch_disconnects(Arc::clone(&peers)).await?;
        let connection = BleConnection::new(config, Arc::clone(&peers));

        Ok(Self {
            discovery,
            connection,
            peers,
            disconnect_watcher,
        })
    }

    /// Disconnect everything and stop background tasks
    pub async fn shutdown(&self) {
        if let Err(e) = self.discovery.stop_scanning().await {
            warn!(error = %e, "failed to stop scan during shutdown");
        }
        self.connection.disconnect_all().await;
        self.disconnect_watcher.abort();
        info!("BLE transport shut down");
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn scan(&self, service: Uuid) -> Result<ScanStream, TransportError> {
        Ok(self
            .discovery
            .start_scanning(service, Arc::clone(&self.peers))
            .await?)
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        Ok(self.discovery.stop_scanning().await?)
    }

    async fn connect(&self, device: &DeviceId) -> Result<(), TransportError> {
        Ok(self.connection.connect(device).await?)
    }

    async fn disconnect(&self, device: &DeviceId) -> Result<(), TransportError> {
        Ok(self.connection.disconnect(device).await?)
    }

    async fn write(
        &self,
        device: &DeviceId,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        Ok(self.connection.write(device, characteristic, bytes).await?)
    }

    async fn subscribe_notifications(
        &self,
        device: &DeviceId,
        characteristic: Uuid,
    ) -> Result<ByteStream, TransportError> {
        Ok(self.connection.subscribe(device, characteristic).await?)
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.disconnect_watcher.abort();
    }
}
