//! Wire protocol: frame codec, payload schema and GATT identifiers

pub mod frame;
pub mod payload;

use uuid::Uuid;

pub use frame::{
    Frame, FrameBuffer, FrameCodec, FrameFormat, MessageType, DEFAULT_EXTENDED_MAX_FRAME_LEN,
    MESSAGE_TYPE_SIZE,
};
pub use payload::{DeviceCheckReply, DeviceCheckRequest, NotificationPayload, VersionReply};

/// Protocol revision announced in `CheckVersion`
pub const PROTOCOL_VERSION: i32 = 1;

/// GATT service advertised by the peer
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_0123456789AB);

/// Characteristic the central writes frames to
pub const WRITE_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_0123456789AB);

/// Characteristic the peer notifies frames on
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_0123456789AB);
