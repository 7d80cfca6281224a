//! Helpers for mapping btleplug data onto the companion-link transport model

use btleplug::platform::PeripheralId;
use twophone_core::DeviceId;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Protocol Utilities
// ----------------------------------------------------------------------------

/// Stable transport identifier for a peripheral
///
/// btleplug identifiers differ per platform (BD address, CoreBluetooth UUID),
/// so the debug rendering is used as the opaque key.
pub fn device_id_for(id: &PeripheralId) -> DeviceId {
    DeviceId::new(format!("{id:?}"))
}

/// Whether an advertisement is acceptable for `service`
///
/// Some platforms omit the service list from cached properties even when the
/// scan filter matched, so an empty list is accepted.
pub fn advertises_service(services: &[Uuid], service: Uuid) -> bool {
    services.is_empty() || services.contains(&service)
}

/// Split an encoded frame into characteristic-sized writes
pub fn write_chunks(data: &[u8], chunk_size: usize) -> impl Iterator<Item = &[u8]> {
    data.chunks(chunk_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use twophone_core::SERVICE_UUID;

    #[test]
    fn test_service_matching() {
        assert!(advertises_service(&[], SERVICE_UUID));
        assert!(advertises_service(&[Uuid::nil(), SERVICE_UUID], SERVICE_UUID));
        assert!(!advertises_service(&[Uuid::nil()], SERVICE_UUID));
    }

    #[test]
    fn test_write_chunks() {
        let data = [0u8; 500];
        let sizes: Vec<usize> = write_chunks(&data, 244).map(<[u8]>::len).collect();
        assert_eq!(sizes, vec![244, 244, 12]);

        assert_eq!(write_chunks(&[], 244).count(), 0);
        assert_eq!(write_chunks(&data[..3], 0).count(), 3);
    }
}
