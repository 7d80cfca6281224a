//! Error types for the companion-link protocol
//!
//! Each concern gets its own enum (codec, session, transport, store) and
//! `TwophoneError` unifies them for callers that do not care which layer failed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::MessageType;
use crate::session::SessionState;

// ----------------------------------------------------------------------------
// Codec Errors
// ----------------------------------------------------------------------------

/// Errors raised while parsing a frame prefix.
///
/// "Not enough bytes yet" is not an error; the codec reports it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed length field: {reason}")]
    MalformedLength { reason: String },

    #[error("Malformed frame: declared length {declared} is smaller than the {header_size}-byte header")]
    MalformedFrame { declared: usize, header_size: usize },

    #[error("Unknown message type: {message_type:#06x}")]
    UnknownMessageType { message_type: u16 },

    #[error("Frame too large: {size} bytes (max: {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },
}

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Errors reported by a radio transport implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {device}: {reason}")]
    ConnectionFailed { device: String, reason: String },

    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Device not connected: {device}")]
    NotConnected { device: String },

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: Uuid },

    #[error("Failed to write to {device}: {reason}")]
    WriteFailed { device: String, reason: String },

    #[error("Failed to subscribe to notifications from {device}: {reason}")]
    SubscriptionFailed { device: String, reason: String },

    #[error("Scan failed: {reason}")]
    ScanFailed { reason: String },

    #[error("Radio adapter not available")]
    AdapterUnavailable,

    #[error("Transport timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

// ----------------------------------------------------------------------------
// Store Errors
// ----------------------------------------------------------------------------

/// Errors raised by a persistent device store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Device store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Device store corrupt: {reason}")]
    Corrupt { reason: String },
}

// ----------------------------------------------------------------------------
// Session Errors
// ----------------------------------------------------------------------------

/// Failure classification used by the orchestrator's retry policy
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    VersionMismatch,
    DeviceUnregistered,
    IllegalOperatingSystem,
    MalformedPayload,
    MalformedStream,
    Timeout,
    LinkLost,
    ConnectFailed,
    Transport,
    Store,
    Cancelled,
    Internal,
}

/// Errors that end a session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Protocol version {local} rejected by peer")]
    VersionMismatch { local: i32 },

    #[error("Device is not registered with the peer")]
    DeviceUnregistered,

    #[error("Illegal operating system tag: {tag}")]
    IllegalOperatingSystem { tag: u8 },

    #[error("Malformed {message_type} payload: {reason}")]
    MalformedPayload {
        message_type: MessageType,
        reason: String,
    },

    #[error("Inbound stream corrupt: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport disconnected")]
    TransportDisconnected,

    #[error("Connect failed: {0}")]
    ConnectFailed(TransportError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No reply while {stage} after {duration_ms}ms")]
    Timeout { stage: SessionState, duration_ms: u64 },

    #[error("A waiter for {message_type} frames is already registered")]
    DuplicateWaiter { message_type: MessageType },

    #[error("Device store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session cancelled by local request")]
    Cancelled,

    #[error("Operation not valid while {state}")]
    InvalidState { state: SessionState },
}

impl SessionError {
    /// Classify this error for retry decisions
    pub fn kind(&self) -> FailureKind {
        match self {
            SessionError::VersionMismatch { .. } => FailureKind::VersionMismatch,
            SessionError::DeviceUnregistered => FailureKind::DeviceUnregistered,
            SessionError::IllegalOperatingSystem { .. } => FailureKind::IllegalOperatingSystem,
            SessionError::MalformedPayload { .. } => FailureKind::MalformedPayload,
            SessionError::Codec(_) => FailureKind::MalformedStream,
            SessionError::TransportDisconnected => FailureKind::LinkLost,
            SessionError::ConnectFailed(_) => FailureKind::ConnectFailed,
            SessionError::Transport(_) => FailureKind::Transport,
            SessionError::Timeout { .. } => FailureKind::Timeout,
            SessionError::DuplicateWaiter { .. } => FailureKind::Internal,
            SessionError::Store(_) => FailureKind::Store,
            SessionError::Cancelled => FailureKind::Cancelled,
            SessionError::InvalidState { .. } => FailureKind::Internal,
        }
    }

    pub(crate) fn malformed<T: Into<String>>(message_type: MessageType, reason: T) -> Self {
        SessionError::MalformedPayload {
            message_type,
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Core error type for the companion-link crates
#[derive(Debug, thiserror::Error)]
pub enum TwophoneError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Channel error: {message}")]
    Channel { message: String },
}

impl TwophoneError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        TwophoneError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        TwophoneError::Channel {
            message: message.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, TwophoneError>;
pub type TwophoneResult<T> = Result<T>;
