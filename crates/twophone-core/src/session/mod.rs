//! Per-device session: handshake state machine and steady-state streaming
//!
//! A session walks `Idle -> VersionChecking -> DeviceChecking -> (OsNegotiating)
//! -> Streaming -> Disconnecting -> Closed`. Handshake failures jump straight to
//! `Closed`; only an explicit forget passes through `Disconnecting`.

mod machine;
pub mod router;

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::errors::SessionError;
use crate::types::DiscoveredDevice;

pub use machine::Session;
pub use router::{FrameRouter, Routed};

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Lifecycle position of a session; ordering follows the forward path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    VersionChecking,
    DeviceChecking,
    OsNegotiating,
    Streaming,
    Disconnecting,
    Closed,
}

impl SessionState {
    /// Between the first handshake write and steady state, inclusive
    pub fn is_live(self) -> bool {
        (SessionState::VersionChecking..=SessionState::Streaming).contains(&self)
    }

    pub fn is_handshaking(self) -> bool {
        (SessionState::VersionChecking..=SessionState::OsNegotiating).contains(&self)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::VersionChecking => "checking version",
            SessionState::DeviceChecking => "checking device",
            SessionState::OsNegotiating => "negotiating operating system",
            SessionState::Streaming => "streaming",
            SessionState::Disconnecting => "disconnecting",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Outcomes and Control
// ----------------------------------------------------------------------------

/// How a session that did not fail came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Local forget: `ClearDevice` was sent before teardown
    Forgotten,
    /// The transport dropped the link while streaming
    LinkLost,
    /// Cancelled before reaching steady state
    Cancelled,
    /// Closed by orchestrator shutdown
    Shutdown,
}

/// Requests delivered to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    /// Forget the device: send `ClearDevice`, then tear down
    Disconnect,
    /// Tear down without notifying the peer
    Close,
}

/// Fold a local cancellation into a regular outcome
pub fn settle(result: Result<SessionOutcome, SessionError>) -> Result<SessionOutcome, SessionError> {
    match result {
        Err(SessionError::Cancelled) => Ok(SessionOutcome::Cancelled),
        other => other,
    }
}

// ----------------------------------------------------------------------------
// Session Handle
// ----------------------------------------------------------------------------

/// Cloneable remote control for a session owned by another task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    device: DiscoveredDevice,
    state: watch::Receiver<SessionState>,
    control: mpsc::Sender<SessionControl>,
}

impl SessionHandle {
    pub(crate) fn new(
        device: DiscoveredDevice,
        state: watch::Receiver<SessionState>,
        control: mpsc::Sender<SessionControl>,
    ) -> Self {
        Self {
            device,
            state,
            control,
        }
    }

    pub fn device(&self) -> &DiscoveredDevice {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Ask the session to forget the device; false if it already ended
    pub fn request_disconnect(&self) -> bool {
        self.control.try_send(SessionControl::Disconnect).is_ok()
    }

    /// Ask the session to close without notifying the peer
    pub fn request_close(&self) -> bool {
        self.control.try_send(SessionControl::Close).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_range() {
        assert!(!SessionState::Idle.is_live());
        assert!(SessionState::VersionChecking.is_live());
        assert!(SessionState::Streaming.is_live());
        assert!(!SessionState::Disconnecting.is_live());
        assert!(!SessionState::Closed.is_live());

        assert!(SessionState::OsNegotiating.is_handshaking());
        assert!(!SessionState::Streaming.is_handshaking());
    }

    #[test]
    fn test_settle_cancellation() {
        assert_eq!(
            settle(Err(SessionError::Cancelled)).unwrap(),
            SessionOutcome::Cancelled
        );
        assert!(settle(Err(SessionError::DeviceUnregistered)).is_err());
    }
}
