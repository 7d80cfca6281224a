//! Core identifiers and value types

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{SessionError, StoreError};
use crate::store::DeviceStore;

// ----------------------------------------------------------------------------
// Device Identifiers
// ----------------------------------------------------------------------------

/// Platform-level identifier of a remote device, as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new<T: Into<String>>(id: T) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A device seen by a scan, or handed to a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Advertised name, used for matching against desired devices
    pub name: String,
    /// Platform identifier, stable for the lifetime of the transport
    pub id: DeviceId,
}

impl DiscoveredDevice {
    pub fn new<N: Into<String>>(name: N, id: DeviceId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

// ----------------------------------------------------------------------------
// Device Identity Token
// ----------------------------------------------------------------------------

/// Locally generated token that proves repeat pairing to a remote peer
///
/// One token exists per platform identifier. It is created on first contact and
/// persisted in the [`DeviceStore`] so later sessions present the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().to_uppercase())
    }

    pub fn from_token<T: Into<String>>(token: T) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Look up the token for `device`, creating and persisting one if absent
    pub fn resolve(store: &dyn DeviceStore, device: &DeviceId) -> Result<Self, StoreError> {
        if let Some(token) = store.get_device_identity(device)? {
            return Ok(Self(token));
        }

        let identity = Self::generate();
        store.set_device_identity(device, identity.as_str())?;
        tracing::debug!(device = %device, "created device identity");
        Ok(identity)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Operating System
// ----------------------------------------------------------------------------

/// Operating system of a paired device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Android,
    Ios,
}

impl OperatingSystem {
    /// One-byte wire tag
    pub const fn tag(self) -> u8 {
        match self {
            OperatingSystem::Android => 0,
            OperatingSystem::Ios => 1,
        }
    }
}

impl TryFrom<u8> for OperatingSystem {
    type Error = SessionError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(OperatingSystem::Android),
            1 => Ok(OperatingSystem::Ios),
            tag => Err(SessionError::IllegalOperatingSystem { tag }),
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingSystem::Android => write!(f, "Android"),
            OperatingSystem::Ios => write!(f, "iOS"),
        }
    }
}

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

/// A forwarded notification as delivered by one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// A notification tagged with the device that forwarded it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNotification {
    pub device_name: String,
    pub device_id: DeviceId,
    pub title: String,
    pub body: String,
}

impl DeviceNotification {
    pub fn new(device: &DiscoveredDevice, notification: Notification) -> Self {
        Self {
            device_name: device.name.clone(),
            device_id: device.id.clone(),
            title: notification.title,
            body: notification.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDeviceStore;

    #[test]
    fn test_operating_system_tags() {
        assert_eq!(OperatingSystem::try_from(0).unwrap(), OperatingSystem::Android);
        assert_eq!(OperatingSystem::try_from(1).unwrap(), OperatingSystem::Ios);
        assert!(matches!(
            OperatingSystem::try_from(7),
            Err(SessionError::IllegalOperatingSystem { tag: 7 })
        ));
        assert_eq!(OperatingSystem::Ios.tag(), 1);
    }

    #[test]
    fn test_identity_is_created_once() {
        let store = MemoryDeviceStore::new();
        let device = DeviceId::new("AA:BB:CC:DD:EE:FF");

        let first = DeviceIdentity::resolve(&store, &device).unwrap();
        let second = DeviceIdentity::resolve(&store, &device).unwrap();
        assert_eq!(first, second);

        let other = DeviceIdentity::resolve(&store, &DeviceId::new("11:22:33:44:55:66")).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_generated_identity_format() {
        let identity = DeviceIdentity::generate();
        assert_eq!(identity.as_str().len(), 36);
        assert_eq!(identity.as_str(), identity.as_str().to_uppercase());
    }
}
