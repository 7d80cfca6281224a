//! BLE connection management and data transmission

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::channel::mpsc;
use futures::stream::StreamExt;
use tokio::time::timeout;
use tracing::{debug, error, info};
use twophone_core::{ByteStream, DeviceId};
use uuid::Uuid;

use crate::config::BleTransportConfig;
use crate::error::BleTransportError;
use crate::peer::PeerMap;
use crate::protocol::write_chunks;

// ----------------------------------------------------------------------------
// Connection Management
// ----------------------------------------------------------------------------

/// Handles BLE connections and data transmission
pub(crate) struct BleConnection {
    config: BleTransportConfig,
    peers: PeerMap,
}

impl BleConnection {
    pub fn new(config: BleTransportConfig, peers: PeerMap) -> Self {
        Self { config, peers }
    }

    /// Connect and discover GATT services
    pub async fn connect(&self, device: &DeviceId) -> Result<(), BleTransportError> {
        let peripheral = self.peripheral(device).await?;

        let connected = peripheral.is_connected().await.unwrap_or(false);
        if !connected {
            peripheral
                .connect()
                .await
                .map_err(|e| BleTransportError::ConnectionFailed {
                    device: device.to_string(),
                    reason: e.to_string(),
                })?;
        }

        let discovery_timeout = self.config.service_discovery_timeout();
        match timeout(discovery_timeout, peripheral.discover_services()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(%device, error = %e, "service discovery failed");
                return Err(BleTransportError::ServiceDiscoveryFailed {
                    device: device.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(BleTransportError::ConnectionTimeout {
                    device: device.to_string(),
                    duration_ms: discovery_timeout.as_millis() as u64,
                })
            }
        }

        info!(%device, "connected to peripheral");
        Ok(())
    }

    /// Subscribe to `characteristic` and forward its values as a byte stream
    pub async fn subscribe(
        &self,
        device: &DeviceId,
        characteristic: Uuid,
    ) -> Result<ByteStream, BleTransportError> {
        let peripheral = self.peripheral(device).await?;
        let target = find_characteristic(&peripheral, characteristic)?;

        peripheral
            .subscribe(&target)
            .await
            .map_err(|e| BleTransportError::SubscriptionFailed {
                device: device.to_string(),
                reason: e.to_string(),
            })?;

        let mut notifications =
            peripheral
                .notifications()
                .await
                .map_err(|e| BleTransportError::SubscriptionFailed {
                    device: device.to_string(),
                    reason: e.to_string(),
                })?;

        let (tx, rx) = mpsc::unbounded();
        let forwarded = device.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(data) = notifications.next().await {
                if data.uuid != characteristic {
                    continue;
                }
                if tx.unbounded_send(data.value).is_err() {
                    break;
                }
            }
            debug!(device = %forwarded, "notification forwarder ended");
        });

        match self.peers.write().await.get_mut(device) {
            Some(peer) => peer.set_forwarder(forwarder),
            None => forwarder.abort(),
        }

        debug!(%device, %characteristic, "subscribed to notifications");
        Ok(rx.boxed())
    }

    /// Write `data` in MTU-sized chunks
    pub async fn write(
        &self,
        device: &DeviceId,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), BleTransportError> {
        let peripheral = self.peripheral(device).await?;
        let target = find_characteristic(&peripheral, characteristic)?;
        let write_type = if self.config.write_with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        for chunk in write_chunks(data, self.config.write_chunk_size) {
            peripheral
                .write(&target, chunk, write_type)
                .await
                .map_err(|e| BleTransportError::WriteFailed {
                    device: device.to_string(),
                    reason: e.to_string(),
                })?;
        }

        debug!(%device, len = data.len(), "wrote frame");
        Ok(())
    }

    /// Stop forwarding and drop the link; unknown devices are ignored
    pub async fn disconnect(&self, device: &DeviceId) -> Result<(), BleTransportError> {
        let peripheral = {
            let mut peers = self.peers.write().await;
            match peers.get_mut(device) {
                Some(peer) => {
                    peer.stop_forwarding();
                    peer.peripheral.clone()
                }
                None => return Ok(()),
            }
        };

        if peripheral.is_connected().await.unwrap_or(false) {
            peripheral
                .disconnect()
                .await
                .map_err(|e| BleTransportError::ConnectionFailed {
                    device: device.to_string(),
                    reason: format!("disconnect failed: {e}"),
                })?;
            info!(%device, "disconnected from peripheral");
        }
        Ok(())
    }

    /// Disconnect every known peripheral
    pub async fn disconnect_all(&self) {
        let devices: Vec<DeviceId> = self.peers.read().await.keys().cloned().collect();
        for device in devices {
            if let Err(e) = self.disconnect(&device).await {
                error!(%device, error = %e, "failed to disconnect");
            }
        }
    }

    async fn peripheral(&self, device: &DeviceId) -> Result<Peripheral, BleTransportError> {
        self.peers
            .read()
            .await
            .get(device)
            .map(|peer| peer.peripheral.clone())
            .ok_or_else(|| BleTransportError::PeripheralNotFound {
                device: device.to_string(),
            })
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    uuid: Uuid,
) -> Result<Characteristic, BleTransportError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or(BleTransportError::CharacteristicNotFound {
            characteristic: uuid,
        })
}
