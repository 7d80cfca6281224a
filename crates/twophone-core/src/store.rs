//! Persistent device store abstraction
//!
//! Two pieces of state survive restarts: the identity token issued for each
//! platform identifier and the ordered list of device names the user paired.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::StoreError;
use crate::types::DeviceId;

// ----------------------------------------------------------------------------
// Store Trait
// ----------------------------------------------------------------------------

/// Key-value storage for identity tokens and known device names
pub trait DeviceStore: Send + Sync {
    fn get_device_identity(&self, device: &DeviceId) -> Result<Option<String>, StoreError>;

    fn set_device_identity(&self, device: &DeviceId, token: &str) -> Result<(), StoreError>;

    /// Known names in insertion order
    fn list_known_device_names(&self) -> Result<Vec<String>, StoreError>;

    /// Append `name` unless already present
    fn add_known_device_name(&self, name: &str) -> Result<(), StoreError>;

    fn remove_known_device_name(&self, name: &str) -> Result<(), StoreError>;
}

// ----------------------------------------------------------------------------
// In-Memory Store
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    identities: HashMap<DeviceId, String>,
    known_devices: Vec<String>,
}

/// Volatile [`DeviceStore`] for tests and embedders that persist elsewhere
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    state: Mutex<MemoryState>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already knows `names`
    pub fn with_known_devices<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            for name in names {
                let name = name.into();
                if !state.known_devices.contains(&name) {
                    state.known_devices.push(name);
                }
            }
        }
        store
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Unavailable {
            reason: "store lock poisoned".to_string(),
        })
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn get_device_identity(&self, device: &DeviceId) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.identities.get(device).cloned())
    }

    fn set_device_identity(&self, device: &DeviceId, token: &str) -> Result<(), StoreError> {
        self.lock()?
            .identities
            .insert(device.clone(), token.to_string());
        Ok(())
    }

    fn list_known_device_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.known_devices.clone())
    }

    fn add_known_device_name(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.known_devices.iter().any(|known| known == name) {
            state.known_devices.push(name.to_string());
        }
        Ok(())
    }

    fn remove_known_device_name(&self, name: &str) -> Result<(), StoreError> {
        self.lock()?.known_devices.retain(|known| known != name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_keep_order_and_dedupe() {
        let store = MemoryDeviceStore::new();
        store.add_known_device_name("Pixel").unwrap();
        store.add_known_device_name("Galaxy").unwrap();
        store.add_known_device_name("Pixel").unwrap();

        assert_eq!(store.list_known_device_names().unwrap(), vec!["Pixel", "Galaxy"]);

        store.remove_known_device_name("Pixel").unwrap();
        assert_eq!(store.list_known_device_names().unwrap(), vec!["Galaxy"]);
    }

    #[test]
    fn test_identity_round_trip() {
        let store = MemoryDeviceStore::new();
        let device = DeviceId::new("peripheral-1");
        assert_eq!(store.get_device_identity(&device).unwrap(), None);

        store.set_device_identity(&device, "TOKEN").unwrap();
        assert_eq!(store.get_device_identity(&device).unwrap().as_deref(), Some("TOKEN"));
    }

    #[test]
    fn test_seeded_store() {
        let store = MemoryDeviceStore::with_known_devices(["A", "B", "A"]);
        assert_eq!(store.list_known_device_names().unwrap(), vec!["A", "B"]);
    }
}
