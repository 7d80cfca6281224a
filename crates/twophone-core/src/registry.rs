//! Desired and connected device registries
//!
//! Both registries have a single writer (the orchestrator task) and publish a
//! fresh snapshot over a `watch` channel as part of every mutation, so readers
//! never observe a half-applied change.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::types::{DeviceId, OperatingSystem};

// ----------------------------------------------------------------------------
// Desired Devices
// ----------------------------------------------------------------------------

/// Ordered set of device names the orchestrator should try to reach
#[derive(Debug)]
pub struct DesiredDeviceRegistry {
    names: Vec<String>,
    published: watch::Sender<Vec<String>>,
}

impl Default for DesiredDeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DesiredDeviceRegistry {
    pub fn new() -> Self {
        let (published, _) = watch::channel(Vec::new());
        Self {
            names: Vec::new(),
            published,
        }
    }

    /// Append `name`; returns false if it was already present
    pub fn insert(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        self.publish();
        true
    }

    /// Remove `name`; returns false if it was absent
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.names.len();
        self.names.retain(|desired| desired != name);
        if self.names.len() == before {
            return false;
        }
        self.publish();
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|desired| desired == name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.published.subscribe()
    }

    fn publish(&self) {
        self.published.send_replace(self.names.clone());
    }
}

// ----------------------------------------------------------------------------
// Connected Devices
// ----------------------------------------------------------------------------

/// A device whose session is in steady state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedDevice {
    pub id: DeviceId,
    pub name: String,
    pub operating_system: Option<OperatingSystem>,
}

/// Published set of streaming sessions, keyed by device identifier
#[derive(Debug)]
pub struct ConnectedDeviceRegistry {
    devices: Vec<ConnectedDevice>,
    published: watch::Sender<Vec<ConnectedDevice>>,
}

impl Default for ConnectedDeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectedDeviceRegistry {
    pub fn new() -> Self {
        let (published, _) = watch::channel(Vec::new());
        Self {
            devices: Vec::new(),
            published,
        }
    }

    /// Add or refresh the entry for `device.id`
    pub fn on_session_entered_streaming(&mut self, device: ConnectedDevice) {
        match self.devices.iter_mut().find(|known| known.id == device.id) {
            Some(existing) => *existing = device,
            None => self.devices.push(device),
        }
        self.publish();
    }

    /// Remove by identifier; returns false if nothing was registered
    pub fn on_session_left_streaming(&mut self, id: &DeviceId) -> bool {
        let before = self.devices.len();
        self.devices.retain(|known| &known.id != id);
        if self.devices.len() == before {
            return false;
        }
        self.publish();
        true
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.iter().any(|known| &known.id == id)
    }

    pub fn snapshot(&self) -> Vec<ConnectedDevice> {
        self.devices.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ConnectedDevice>> {
        self.published.subscribe()
    }

    pub fn clear(&mut self) {
        if self.devices.is_empty() {
            return;
        }
        self.devices.clear();
        self.publish();
    }

    fn publish(&self) {
        self.published.send_replace(self.devices.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(id: &str, name: &str) -> ConnectedDevice {
        ConnectedDevice {
            id: DeviceId::new(id),
            name: name.to_string(),
            operating_system: Some(OperatingSystem::Android),
        }
    }

    #[test]
    fn test_desired_insert_is_idempotent() {
        let mut desired = DesiredDeviceRegistry::new();
        let rx = desired.subscribe();

        assert!(desired.insert("Pixel"));
        assert!(!desired.insert("Pixel"));
        assert!(desired.insert("Galaxy"));
        assert_eq!(*rx.borrow(), vec!["Pixel", "Galaxy"]);

        assert!(desired.remove("Pixel"));
        assert!(!desired.remove("Pixel"));
        assert_eq!(*rx.borrow(), vec!["Galaxy"]);
    }

    #[test]
    fn test_desired_publishes_only_on_change() {
        let mut desired = DesiredDeviceRegistry::new();
        let mut rx = desired.subscribe();
        desired.insert("Pixel");
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        desired.insert("Pixel");
        desired.remove("Unknown");
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_connected_never_duplicates_ids() {
        let mut registry = ConnectedDeviceRegistry::new();
        registry.on_session_entered_streaming(connected("id-1", "Pixel"));
        registry.on_session_entered_streaming(connected("id-1", "Pixel (renamed)"));
        registry.on_session_entered_streaming(connected("id-2", "Galaxy"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "Pixel (renamed)");
    }

    #[test]
    fn test_connected_removal_by_id() {
        let mut registry = ConnectedDeviceRegistry::new();
        let rx = registry.subscribe();
        registry.on_session_entered_streaming(connected("id-1", "Pixel"));

        assert!(registry.on_session_left_streaming(&DeviceId::new("id-1")));
        assert!(!registry.on_session_left_streaming(&DeviceId::new("id-1")));
        assert!(rx.borrow().is_empty());
    }

    #[test]
    fn test_publish_wakes_pending_subscriber() {
        let mut registry = ConnectedDeviceRegistry::new();
        let mut rx = registry.subscribe();
        let mut changed = tokio_test::task::spawn(rx.changed());

        tokio_test::assert_pending!(changed.poll());
        registry.on_session_entered_streaming(connected("id-1", "Pixel"));
        assert!(changed.is_woken());
        tokio_test::assert_ready_ok!(changed.poll());
    }
}
