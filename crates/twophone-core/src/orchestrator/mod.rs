//! Connection orchestrator
//!
//! Turns the desired-device list into scan and connect actions. The orchestrator
//! runs as one task that owns both registries; sessions run in their own tasks
//! and report back over a channel, so registry writes never race.

mod handle;
mod policy;
mod scan;

use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::errors::SessionError;
use crate::registry::{ConnectedDevice, ConnectedDeviceRegistry, DesiredDeviceRegistry};
use crate::session::{settle, Session, SessionHandle, SessionOutcome};
use crate::store::DeviceStore;
use crate::transport::{ScanBatch, ScanStream, Transport};
use crate::types::{DeviceIdentity, DeviceNotification, DiscoveredDevice, Notification, OperatingSystem};

pub use handle::{OrchestratorEvent, OrchestratorHandle};
pub use policy::RetryPolicy;
pub use scan::{ScanGate, ScanTransition};

use handle::OrchestratorCommand;

// ----------------------------------------------------------------------------
// Session Bookkeeping
// ----------------------------------------------------------------------------

/// Reports from session tasks
#[derive(Debug)]
enum SessionEvent {
    Streaming {
        device: DiscoveredDevice,
        operating_system: Option<OperatingSystem>,
    },
    Finished {
        device: DiscoveredDevice,
        result: Result<SessionOutcome, SessionError>,
    },
}

/// A session that has not reported `Finished` yet
#[derive(Debug)]
struct LiveSession {
    device: DiscoveredDevice,
    handle: SessionHandle,
    task: JoinHandle<()>,
    disconnect_requested: bool,
}

// ----------------------------------------------------------------------------
// Orchestrator
// ----------------------------------------------------------------------------

/// Single owner of the desired and connected registries
pub struct ConnectionOrchestrator {
    transport: Arc<dyn Transport>,
    store: Arc<dyn DeviceStore>,
    config: OrchestratorConfig,
    desired: DesiredDeviceRegistry,
    connected: ConnectedDeviceRegistry,
    gate: ScanGate,
    scan: Option<ScanStream>,
    rescan_at: Option<Instant>,
    live: HashMap<String, LiveSession>,
    commands: mpsc::Receiver<OrchestratorCommand>,
    session_tx: mpsc::UnboundedSender<SessionEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    notifications: broadcast::Sender<DeviceNotification>,
    events: broadcast::Sender<OrchestratorEvent>,
}

impl ConnectionOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn DeviceStore>,
        config: OrchestratorConfig,
    ) -> (Self, OrchestratorHandle) {
        let (command_tx, commands) = mpsc::channel(config.command_buffer_size.max(1));
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(config.event_buffer_size.max(1));
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));

        let desired = DesiredDeviceRegistry::new();
        let connected = ConnectedDeviceRegistry::new();

        let handle = OrchestratorHandle::new(
            command_tx,
            connected.subscribe(),
            desired.subscribe(),
            notifications.clone(),
            events.clone(),
        );

        let orchestrator = Self {
            transport,
            store,
            config,
            desired,
            connected,
            gate: ScanGate::new(),
            scan: None,
            rescan_at: None,
            live: HashMap::new(),
            commands,
            session_tx,
            session_rx,
            notifications,
            events,
        };

        (orchestrator, handle)
    }

    /// Build an orchestrator and run it on its own task
    pub fn spawn(
        transport: Arc<dyn Transport>,
        store: Arc<dyn DeviceStore>,
        config: OrchestratorConfig,
    ) -> OrchestratorHandle {
        let (orchestrator, handle) = Self::new(transport, store, config);
        tokio::spawn(orchestrator.run());
        handle
    }

    /// Main loop; returns after shutdown or once every handle is dropped
    pub async fn run(mut self) {
        self.seed_from_store();
        self.sync_scanning().await;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(OrchestratorCommand::Connect { name }) => self.handle_connect(name).await,
                    Some(OrchestratorCommand::Disconnect { name }) => self.handle_disconnect(name).await,
                    Some(OrchestratorCommand::Shutdown { ack }) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                Some(event) = self.session_rx.recv() => self.handle_session_event(event).await,
                batch = next_batch(&mut self.scan) => match batch {
                    Some(batch) => self.handle_scan_batch(batch).await,
                    None => self.handle_scan_ended(),
                },
                _ = rescan_timer(self.rescan_at) => {
                    self.rescan_at = None;
                    self.sync_scanning().await;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle_connect(&mut self, name: String) {
        if let Some(live) = self.live.get(&name) {
            if !live.disconnect_requested {
                debug!(device = %name, state = %live.handle.state(), "connect ignored, session already live");
                return;
            }
        }

        if self.desired.insert(&name) {
            info!(device = %name, "device desired");
            self.sync_scanning().await;
        }
    }

    async fn handle_disconnect(&mut self, name: String) {
        let was_desired = self.desired.remove(&name);

        if let Some(live) = self.live.get_mut(&name) {
            live.disconnect_requested = true;
            if !live.handle.request_disconnect() {
                debug!(device = %name, "session already ending");
            }
        }

        if let Err(e) = self.store.remove_known_device_name(&name) {
            warn!(device = %name, error = %e, "failed to forget device name");
        }
        info!(device = %name, "device forgotten");

        if was_desired {
            self.sync_scanning().await;
        }
    }

    fn seed_from_store(&mut self) {
        match self.store.list_known_device_names() {
            Ok(names) => {
                for name in names {
                    self.desired.insert(&name);
                }
                debug!(count = self.desired.len(), "seeded desired devices from store");
            }
            Err(e) => warn!(error = %e, "could not load known devices"),
        }
    }

    // ------------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------------

    /// Start or stop the scan when desired-emptiness changed
    async fn sync_scanning(&mut self) {
        let wanted = !self.desired.is_empty();
        match self.gate.update(wanted) {
            Some(ScanTransition::Start) => {
                self.rescan_at = None;
                match self.transport.scan(self.config.session.service_uuid).await {
                    Ok(stream) => {
                        self.scan = Some(stream);
                        info!(desired = self.desired.len(), "scan started");
                        self.emit(OrchestratorEvent::ScanStarted);
                    }
                    Err(e) => {
                        warn!(error = %e, "scan failed to start");
                        self.gate.reset();
                        self.schedule_rescan();
                    }
                }
            }
            Some(ScanTransition::Stop) => {
                self.scan = None;
                self.rescan_at = None;
                if let Err(e) = self.transport.stop_scan().await {
                    warn!(error = %e, "failed to stop scan");
                }
                info!("scan stopped");
                self.emit(OrchestratorEvent::ScanStopped);
            }
            None => {}
        }
    }

    fn handle_scan_ended(&mut self) {
        self.scan = None;
        if self.gate.is_active() {
            debug!("transport ended the scan");
            self.gate.reset();
            self.emit(OrchestratorEvent::ScanStopped);
            self.schedule_rescan();
        }
    }

    fn schedule_rescan(&mut self) {
        if !self.desired.is_empty() {
            self.rescan_at = Some(Instant::now() + self.config.rescan_delay());
        }
    }

    async fn handle_scan_batch(&mut self, batch: ScanBatch) {
        for device in batch {
            if !self.desired.contains(&device.name) {
                continue;
            }
            if self.is_live(&device) {
                debug!(device = %device.name, id = %device.id, "match skipped, session still live");
                continue;
            }

            // Removal must land before the next match in this batch is considered
            self.desired.remove(&device.name);
            self.sync_scanning().await;
            self.start_session(device).await;
        }
    }

    fn is_live(&self, device: &DiscoveredDevice) -> bool {
        self.live.contains_key(&device.name)
            || self.live.values().any(|live| live.device.id == device.id)
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    async fn start_session(&mut self, device: DiscoveredDevice) {
        let identity = match DeviceIdentity::resolve(self.store.as_ref(), &device.id) {
            Ok(identity) => identity,
            Err(e) => {
                error!(device = %device.name, error = %e, "could not resolve device identity");
                self.on_session_finished(device, Err(SessionError::Store(e)), false)
                    .await;
                return;
            }
        };

        let session = Session::new(
            device.clone(),
            identity,
            Arc::clone(&self.transport),
            self.config.session.clone(),
        );
        let handle = session.handle();
        let task = tokio::spawn(drive_session(
            session,
            self.session_tx.clone(),
            self.notifications.clone(),
        ));

        info!(device = %device.name, id = %device.id, "session started");
        self.emit(OrchestratorEvent::SessionStarted {
            name: device.name.clone(),
        });
        self.live.insert(
            device.name.clone(),
            LiveSession {
                device,
                handle,
                task,
                disconnect_requested: false,
            },
        );
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Streaming {
                device,
                operating_system,
            } => {
                let forgotten = self
                    .live
                    .get(&device.name)
                    .map_or(true, |live| live.disconnect_requested);
                if forgotten {
                    debug!(device = %device.name, "streaming session already being forgotten");
                    return;
                }

                self.connected.on_session_entered_streaming(ConnectedDevice {
                    id: device.id.clone(),
                    name: device.name.clone(),
                    operating_system,
                });
                if let Err(e) = self.store.add_known_device_name(&device.name) {
                    warn!(device = %device.name, error = %e, "failed to remember device name");
                }
                self.emit(OrchestratorEvent::SessionStreaming {
                    name: device.name,
                    operating_system,
                });
            }
            SessionEvent::Finished { device, result } => {
                let requested = self
                    .live
                    .remove(&device.name)
                    .is_some_and(|live| live.disconnect_requested);
                self.on_session_finished(device, result, requested).await;
            }
        }
    }

    async fn on_session_finished(
        &mut self,
        device: DiscoveredDevice,
        result: Result<SessionOutcome, SessionError>,
        requested: bool,
    ) {
        self.connected.on_session_left_streaming(&device.id);
        let requeued = !requested && self.config.retry.should_requeue(&result);

        match result {
            Ok(outcome) => {
                info!(device = %device.name, ?outcome, requeued, "session closed");
                self.emit(OrchestratorEvent::SessionClosed {
                    name: device.name.clone(),
                    outcome,
                    requeued,
                });
            }
            Err(e) => {
                if requeued {
                    warn!(device = %device.name, error = %e, "session failed, will retry");
                } else {
                    error!(device = %device.name, error = %e, "session failed");
                }
                self.emit(OrchestratorEvent::SessionFailed {
                    name: device.name.clone(),
                    kind: e.kind(),
                    reason: e.to_string(),
                    requeued,
                });
            }
        }

        if requeued && self.desired.insert(&device.name) {
            self.sync_scanning().await;
        }
    }

    async fn shutdown(&mut self) {
        info!(sessions = self.live.len(), "orchestrator shutting down");

        if self.gate.is_active() {
            self.gate.reset();
            self.scan = None;
            if let Err(e) = self.transport.stop_scan().await {
                warn!(error = %e, "failed to stop scan");
            }
            self.emit(OrchestratorEvent::ScanStopped);
        }
        self.rescan_at = None;

        for live in self.live.values() {
            live.handle.request_close();
        }

        let deadline = Instant::now() + self.config.shutdown_timeout();
        for (name, mut live) in self.live.drain() {
            if tokio::time::timeout_at(deadline, &mut live.task).await.is_err() {
                warn!(device = %name, "session did not close in time, aborting");
                live.task.abort();
                if let Err(e) = self.transport.disconnect(&live.device.id).await {
                    debug!(device = %name, error = %e, "disconnect after abort failed");
                }
            }
        }

        self.connected.clear();
    }

    fn emit(&self, event: OrchestratorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

// ----------------------------------------------------------------------------
// Task Helpers
// ----------------------------------------------------------------------------

async fn drive_session(
    mut session: Session,
    events: mpsc::UnboundedSender<SessionEvent>,
    notifications: broadcast::Sender<DeviceNotification>,
) {
    let device = session.device().clone();
    let mut inbox = session.take_notifications();

    let result = match session.start().await {
        Ok(()) => {
            let _ = events.send(SessionEvent::Streaming {
                device: device.clone(),
                operating_system: session.operating_system(),
            });

            let stream = session.stream();
            tokio::pin!(stream);
            loop {
                tokio::select! {
                    result = &mut stream => break result,
                    Some(notification) = next_notification(&mut inbox) => {
                        forward(&notifications, &device, notification);
                    }
                }
            }
        }
        Err(e) => Err(e),
    };

    session.close().await;
    if let Some(inbox) = inbox.as_mut() {
        while let Ok(notification) = inbox.try_recv() {
            forward(&notifications, &device, notification);
        }
    }

    let _ = events.send(SessionEvent::Finished {
        device,
        result: settle(result),
    });
}

fn forward(
    notifications: &broadcast::Sender<DeviceNotification>,
    device: &DiscoveredDevice,
    notification: Notification,
) {
    debug!(device = %device.name, title = %notification.title, "notification received");
    let _ = notifications.send(DeviceNotification::new(device, notification));
}

async fn next_notification(
    inbox: &mut Option<mpsc::Receiver<Notification>>,
) -> Option<Notification> {
    match inbox {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn next_batch(scan: &mut Option<ScanStream>) -> Option<ScanBatch> {
    match scan {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

async fn rescan_timer(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}
