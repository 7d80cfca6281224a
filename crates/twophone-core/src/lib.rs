//! Companion-link protocol engine
//!
//! This crate holds everything between the radio and the application: the
//! length-prefixed frame codec, the per-device handshake state machine, the
//! registries of desired and connected devices, and the orchestrator that turns
//! "these devices should be connected" into scan and connect actions. Radio
//! access goes through the [`Transport`] trait and persistence through
//! [`DeviceStore`], so the core runs unchanged against real hardware or mocks.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{OrchestratorConfig, SessionConfig};
pub use errors::{
    CodecError, FailureKind, Result, SessionError, StoreError, TransportError, TwophoneError,
    TwophoneResult,
};
pub use orchestrator::{
    ConnectionOrchestrator, OrchestratorEvent, OrchestratorHandle, RetryPolicy, ScanGate,
    ScanTransition,
};
pub use protocol::{
    Frame, FrameBuffer, FrameCodec, FrameFormat, MessageType, NOTIFY_CHARACTERISTIC_UUID,
    PROTOCOL_VERSION, SERVICE_UUID, WRITE_CHARACTERISTIC_UUID,
};
pub use registry::{ConnectedDevice, ConnectedDeviceRegistry, DesiredDeviceRegistry};
pub use session::{Session, SessionControl, SessionHandle, SessionOutcome, SessionState};
pub use store::{DeviceStore, MemoryDeviceStore};
pub use transport::{ByteStream, ScanBatch, ScanStream, Transport};
pub use types::{
    DeviceId, DeviceIdentity, DeviceNotification, DiscoveredDevice, Notification, OperatingSystem,
};
