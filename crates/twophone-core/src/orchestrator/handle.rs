//! Public handle and event types of the connection orchestrator

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::errors::{FailureKind, Result, TwophoneError};
use crate::registry::ConnectedDevice;
use crate::session::SessionOutcome;
use crate::types::{DeviceNotification, OperatingSystem};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Requests from handles to the orchestrator task
#[derive(Debug)]
pub(crate) enum OrchestratorCommand {
    Connect { name: String },
    Disconnect { name: String },
    Shutdown { ack: oneshot::Sender<()> },
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Observable orchestrator activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorEvent {
    ScanStarted,
    ScanStopped,
    SessionStarted {
        name: String,
    },
    SessionStreaming {
        name: String,
        operating_system: Option<OperatingSystem>,
    },
    /// The session ended with an error; `requeued` separates transient from fatal
    SessionFailed {
        name: String,
        kind: FailureKind,
        reason: String,
        requeued: bool,
    },
    SessionClosed {
        name: String,
        outcome: SessionOutcome,
        requeued: bool,
    },
}

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

/// Cloneable front end to a running [`ConnectionOrchestrator`](super::ConnectionOrchestrator)
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<OrchestratorCommand>,
    connected: watch::Receiver<Vec<ConnectedDevice>>,
    desired: watch::Receiver<Vec<String>>,
    notifications: broadcast::Sender<DeviceNotification>,
    events: broadcast::Sender<OrchestratorEvent>,
}

impl OrchestratorHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<OrchestratorCommand>,
        connected: watch::Receiver<Vec<ConnectedDevice>>,
        desired: watch::Receiver<Vec<String>>,
        notifications: broadcast::Sender<DeviceNotification>,
        events: broadcast::Sender<OrchestratorEvent>,
    ) -> Self {
        Self {
            commands,
            connected,
            desired,
            notifications,
            events,
        }
    }

    /// Ask for `name` to be connected whenever it shows up in a scan
    pub async fn request_connect<N: Into<String>>(&self, name: N) -> Result<()> {
        self.send(OrchestratorCommand::Connect { name: name.into() })
            .await
    }

    /// Forget `name`: stop trying to reach it and end its session if one is live
    pub async fn request_disconnect<N: Into<String>>(&self, name: N) -> Result<()> {
        self.send(OrchestratorCommand::Disconnect { name: name.into() })
            .await
    }

    /// Snapshots of the devices currently streaming
    pub fn connected_devices(&self) -> watch::Receiver<Vec<ConnectedDevice>> {
        self.connected.clone()
    }

    /// Snapshots of the names still waiting for a scan match
    pub fn desired_devices(&self) -> watch::Receiver<Vec<String>> {
        self.desired.clone()
    }

    pub fn notifications(&self) -> broadcast::Receiver<DeviceNotification> {
        self.notifications.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    /// Close every session, stop scanning and wait for the orchestrator to exit
    pub async fn shutdown(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(OrchestratorCommand::Shutdown { ack }).await?;
        done.await
            .map_err(|_| TwophoneError::channel_error("orchestrator exited before acknowledging shutdown"))
    }

    async fn send(&self, command: OrchestratorCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TwophoneError::channel_error("orchestrator is not running"))
    }
}
