//! BLE adapter setup, scanning and link-loss detection

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::stream::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use twophone_core::{DiscoveredDevice, ScanBatch, ScanStream};
use uuid::Uuid;

use crate::config::BleTransportConfig;
use crate::error::BleTransportError;
use crate::peer::{BlePeer, PeerMap};
use crate::protocol::{advertises_service, device_id_for};

// ----------------------------------------------------------------------------
// Discovery Implementation
// ----------------------------------------------------------------------------

/// Handles BLE adapter access and scanning
pub(crate) struct BleDiscovery {
    config: BleTransportConfig,
    adapter: Adapter,
}

impl BleDiscovery {
    /// Open the configured adapter
    pub async fn initialize(config: BleTransportConfig) -> Result<Self, BleTransportError> {
        let manager = Manager::new()
            .await
            .map_err(|e| BleTransportError::ManagerUnavailable(e.to_string()))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| BleTransportError::ManagerUnavailable(e.to_string()))?;

        let adapter = adapters
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BleTransportError::AdapterNotAvailable {
                index: config.adapter_index,
            })?;

        info!(index = config.adapter_index, "BLE adapter initialized");
        Ok(Self { config, adapter })
    }

    /// Start a filtered scan and return discoveries grouped into batches
    pub async fn start_scanning(
        &self,
        service: Uuid,
        peers: PeerMap,
    ) -> Result<ScanStream, BleTransportError> {
        let events = self
            .adapter
            .events()
            .await
            .map_err(|e| BleTransportError::EventStreamFailed(e.to_string()))?;

        self.adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await
            .map_err(|e| BleTransportError::ScanFailed(e.to_string()))?;
        info!(%service, "started BLE scan");

        let adapter = self.adapter.clone();
        let stream = events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                let peers = peers.clone();
                async move {
                    match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                            resolve_discovery(&adapter, &peers, &id, service).await
                        }
                        _ => None,
                    }
                }
            })
            .ready_chunks(self.config.scan_batch_size.max(1))
            .map(|devices| devices.into_iter().collect::<ScanBatch>())
            .boxed();

        Ok(stream)
    }

    /// Stop scanning for peers
    pub async fn stop_scanning(&self) -> Result<(), BleTransportError> {
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| BleTransportError::ScanFailed(e.to_string()))?;
        info!("stopped BLE scan");
        Ok(())
    }

    /// End notification streams of peripherals the adapter reports disconnected
    pub async fn watch_disconnects(
        &self,
        peers: PeerMap,
    ) -> Result<JoinHandle<()>, BleTransportError> {
        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| BleTransportError::EventStreamFailed(e.to_string()))?;

        Ok(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    let device = device_id_for(&id);
                    if let Some(peer) = peers.write().await.get_mut(&device) {
                        if peer.stop_forwarding() {
                            info!(device = %peer.device_name, "peripheral disconnected");
                        }
                    }
                }
            }
            warn!("BLE adapter event stream ended");
        }))
    }
}

/// Turn a discovery event into a named device advertising `service`
async fn resolve_discovery(
    adapter: &Adapter,
    peers: &PeerMap,
    id: &PeripheralId,
    service: Uuid,
) -> Option<DiscoveredDevice> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let properties = peripheral.properties().await.ok().flatten()?;
    let name = properties.local_name?;
    if !advertises_service(&properties.services, service) {
        return None;
    }

    let device = device_id_for(id);
    let mut peers = peers.write().await;
    match peers.get_mut(&device) {
        Some(known) => known.device_name = name.clone(),
        None => {
            debug!(device = %name, id = %device, "discovered peripheral");
            peers.insert(device.clone(), BlePeer::new(peripheral, name.clone()));
        }
    }

    Some(DiscoveredDevice::new(name, device))
}
