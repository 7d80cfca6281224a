//! BLE peer bookkeeping

use std::collections::HashMap;
use std::sync::Arc;

use btleplug::platform::Peripheral as PlatformPeripheral;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use twophone_core::DeviceId;

/// Peripherals seen by scans, keyed by transport identifier
pub(crate) type PeerMap = Arc<RwLock<HashMap<DeviceId, BlePeer>>>;

// ----------------------------------------------------------------------------
// Peer State
// ----------------------------------------------------------------------------

/// A discovered peripheral and its notification forwarder, if subscribed
#[derive(Debug)]
pub(crate) struct BlePeer {
    /// BLE peripheral
    pub peripheral: PlatformPeripheral,
    /// Advertised local name
    pub device_name: String,
    forwarder: Option<JoinHandle<()>>,
}

impl BlePeer {
    pub fn new(peripheral: PlatformPeripheral, device_name: String) -> Self {
        Self {
            peripheral,
            device_name,
            forwarder: None,
        }
    }

    /// Install a forwarder, stopping any previous one
    pub(crate) fn set_forwarder(&mut self, task: JoinHandle<()>) {
        self.stop_forwarding();
        self.forwarder = Some(task);
    }

    /// Stop forwarding; the session's byte stream ends
    pub(crate) fn stop_forwarding(&mut self) -> bool {
        match self.forwarder.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for BlePeer {
    fn drop(&mut self) {
        self.stop_forwarding();
    }
}
