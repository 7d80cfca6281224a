use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::errors::{SessionError, TransportError};
use crate::protocol::payload::{
    decode_json, decode_notification, encode_json, os_tag_payload, parse_os_tag, version_request,
};
use crate::protocol::{
    DeviceCheckReply, DeviceCheckRequest, Frame, FrameBuffer, FrameCodec, MessageType,
    VersionReply,
};
use crate::session::router::{FrameRouter, Routed};
use crate::session::{settle, SessionControl, SessionHandle, SessionOutcome, SessionState};
use crate::transport::{ByteStream, Transport};
use crate::types::{DeviceIdentity, DiscoveredDevice, Notification, OperatingSystem};

const CONTROL_BUFFER_SIZE: usize = 4;

/// What woke a session waiting on its link
enum Wake {
    Chunk(Option<Vec<u8>>),
    Control(Option<SessionControl>),
}

/// Protocol state machine bound to one remote device
///
/// Owned by a single task. Other tasks observe it through a [`SessionHandle`]
/// and receive notifications through the receiver from
/// [`Session::take_notifications`].
pub struct Session {
    device: DiscoveredDevice,
    identity: DeviceIdentity,
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    codec: FrameCodec,
    state: watch::Sender<SessionState>,
    operating_system: Option<OperatingSystem>,
    peer_session_id: Option<String>,
    buffer: FrameBuffer,
    router: FrameRouter,
    inbound: Option<ByteStream>,
    notifications: Option<mpsc::Sender<Notification>>,
    notifications_rx: Option<mpsc::Receiver<Notification>>,
    control_tx: mpsc::Sender<SessionControl>,
    control_rx: mpsc::Receiver<SessionControl>,
    closed: bool,
}

impl Session {
    pub fn new(
        device: DiscoveredDevice,
        identity: DeviceIdentity,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        let codec = config.codec();
        let (state, _) = watch::channel(SessionState::Idle);
        let (notifications, notifications_rx) = mpsc::channel(config.notification_capacity.max(1));
        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER_SIZE);

        Self {
            device,
            identity,
            transport,
            config,
            codec,
            state,
            operating_system: None,
            peer_session_id: None,
            buffer: FrameBuffer::new(codec),
            router: FrameRouter::new(),
            inbound: None,
            notifications: Some(notifications),
            notifications_rx: Some(notifications_rx),
            control_tx,
            control_rx,
            closed: false,
        }
    }

    pub fn device(&self) -> &DiscoveredDevice {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(
            self.device.clone(),
            self.state.subscribe(),
            self.control_tx.clone(),
        )
    }

    /// Negotiated peer OS, known once the handshake completes
    pub fn operating_system(&self) -> Option<OperatingSystem> {
        self.operating_system
    }

    /// Identifier the peer assigned in its version reply, if any
    pub fn peer_session_id(&self) -> Option<&str> {
        self.peer_session_id.as_deref()
    }

    /// Notification stream; can be taken once
    pub fn take_notifications(&mut self) -> Option<mpsc::Receiver<Notification>> {
        self.notifications_rx.take()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Drive the session to completion and release it
    pub async fn run(mut self) -> Result<SessionOutcome, SessionError> {
        let result = match self.start().await {
            Ok(()) => self.stream().await,
            Err(e) => Err(e),
        };
        self.close().await;
        settle(result)
    }

    /// Open the link and run the handshake up to `Streaming`
    ///
    /// On error the session stays where it failed; call [`Session::close`].
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let state = self.state();
        if state != SessionState::Idle {
            return Err(SessionError::InvalidState { state });
        }

        self.open_link().await?;
        self.check_version().await?;
        self.check_device().await?;
        if self.operating_system.is_none() {
            self.negotiate_os().await?;
        }

        self.set_state(SessionState::Streaming);
        info!(
            device = %self.device.name,
            id = %self.device.id,
            os = ?self.operating_system,
            "session streaming"
        );
        Ok(())
    }

    /// Forward notifications until the link drops or a control request arrives
    pub async fn stream(&mut self) -> Result<SessionOutcome, SessionError> {
        let state = self.state();
        if state != SessionState::Streaming {
            return Err(SessionError::InvalidState { state });
        }

        loop {
            // Frames left behind by the handshake come first
            if let Some(frame) = self.buffer.next_frame()? {
                self.deliver(frame).await;
                continue;
            }

            match self.wait().await? {
                Wake::Chunk(Some(chunk)) => self.buffer.extend(&chunk),
                Wake::Chunk(None) => {
                    info!(device = %self.device.name, "link lost while streaming");
                    return Ok(SessionOutcome::LinkLost);
                }
                Wake::Control(Some(SessionControl::Disconnect)) => {
                    self.disconnect().await;
                    return Ok(SessionOutcome::Forgotten);
                }
                Wake::Control(Some(SessionControl::Close)) | Wake::Control(None) => {
                    return Ok(SessionOutcome::Shutdown);
                }
            }
        }
    }

    /// Send `ClearDevice` so the peer forgets this pairing
    async fn disconnect(&mut self) {
        self.set_state(SessionState::Disconnecting);
        if let Err(e) = self.send(MessageType::ClearDevice, &[]).await {
            warn!(device = %self.device.name, error = %e, "failed to send ClearDevice");
        }
    }

    /// Release every session resource; repeated calls do nothing
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.inbound = None;
        self.buffer.clear();
        self.router.clear();
        self.notifications = None;

        if let Err(e) = self.transport.disconnect(&self.device.id).await {
            warn!(device = %self.device.name, error = %e, "transport disconnect failed");
        }
        self.set_state(SessionState::Closed);
        debug!(device = %self.device.name, "session closed");
    }

    // ------------------------------------------------------------------------
    // Handshake Steps
    // ------------------------------------------------------------------------

    async fn open_link(&mut self) -> Result<(), SessionError> {
        let transport = Arc::clone(&self.transport);
        let device = self.device.id.clone();
        let notify = self.config.notify_characteristic;
        let timeout = self.config.connect_timeout();

        let link = async move {
            transport
                .connect(&device)
                .await
                .map_err(SessionError::ConnectFailed)?;
            transport
                .subscribe_notifications(&device, notify)
                .await
                .map_err(SessionError::ConnectFailed)
        };

        debug!(device = %self.device.name, "connecting");
        let inbound = tokio::select! {
            result = tokio::time::timeout(timeout, link) => match result {
                Ok(inbound) => inbound?,
                Err(_) => {
                    return Err(SessionError::ConnectFailed(TransportError::Timeout {
                        duration_ms: timeout.as_millis() as u64,
                    }))
                }
            },
            _ = self.control_rx.recv() => return Err(SessionError::Cancelled),
        };

        self.inbound = Some(inbound);
        Ok(())
    }

    async fn check_version(&mut self) -> Result<(), SessionError> {
        self.set_state(SessionState::VersionChecking);
        let local = self.config.protocol_version;

        let reply = self
            .exchange(MessageType::CheckVersion, &version_request(local))
            .await?;
        let reply: VersionReply = decode_json(MessageType::CheckVersion, reply.payload())?;
        if !reply.version_matched {
            return Err(SessionError::VersionMismatch { local });
        }

        self.peer_session_id = reply.session_id;
        Ok(())
    }

    async fn check_device(&mut self) -> Result<(), SessionError> {
        self.set_state(SessionState::DeviceChecking);
        let request = DeviceCheckRequest {
            uuid: self.identity.as_str().to_string(),
            os: self.config.local_os.tag(),
        };
        let body = encode_json(MessageType::CheckDevice, &request)?;

        let reply = self.exchange(MessageType::CheckDevice, &body).await?;
        let reply: DeviceCheckReply = decode_json(MessageType::CheckDevice, reply.payload())?;
        if !reply.valid_device {
            return Err(SessionError::DeviceUnregistered);
        }

        if let Some(tag) = reply.os {
            self.operating_system = Some(OperatingSystem::try_from(tag)?);
        }
        Ok(())
    }

    async fn negotiate_os(&mut self) -> Result<(), SessionError> {
        self.set_state(SessionState::OsNegotiating);
        let body = os_tag_payload(self.config.local_os);

        let reply = self
            .exchange(MessageType::CheckOperatingSystem, &body)
            .await?;
        self.operating_system = Some(parse_os_tag(reply.payload())?);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Frame I/O
    // ------------------------------------------------------------------------

    /// Write one request and wait for the first reply of the same type
    ///
    /// The reply timeout covers the write as well as the wait.
    async fn exchange(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
    ) -> Result<Frame, SessionError> {
        let stage = self.state();
        let timeout = self.config.reply_timeout();
        let mut reply = self.router.register(message_type)?;

        let round_trip = async {
            self.send(message_type, payload).await?;
            self.await_reply(&mut reply).await
        };
        let result = match tokio::time::timeout(timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout {
                stage,
                duration_ms: timeout.as_millis() as u64,
            }),
        };

        self.router.cancel(message_type);
        result
    }

    /// Decode one frame at a time until `reply` is satisfied
    ///
    /// Bytes after the reply stay buffered for the next step.
    async fn await_reply(
        &mut self,
        reply: &mut oneshot::Receiver<Frame>,
    ) -> Result<Frame, SessionError> {
        loop {
            match reply.try_recv() {
                Ok(frame) => return Ok(frame),
                Err(oneshot::error::TryRecvError::Closed) => return Err(SessionError::Cancelled),
                Err(oneshot::error::TryRecvError::Empty) => {}
            }

            if let Some(frame) = self.buffer.next_frame()? {
                if let Routed::Unclaimed(frame) = self.router.route(frame) {
                    self.drop_unclaimed(&frame);
                }
                continue;
            }

            match self.wait().await? {
                Wake::Chunk(Some(chunk)) => self.buffer.extend(&chunk),
                Wake::Chunk(None) => return Err(SessionError::TransportDisconnected),
                Wake::Control(_) => return Err(SessionError::Cancelled),
            }
        }
    }

    async fn wait(&mut self) -> Result<Wake, SessionError> {
        let Some(inbound) = self.inbound.as_mut() else {
            return Err(SessionError::TransportDisconnected);
        };

        Ok(tokio::select! {
            chunk = inbound.next() => Wake::Chunk(chunk),
            control = self.control_rx.recv() => Wake::Control(control),
        })
    }

    async fn send(&mut self, message_type: MessageType, payload: &[u8]) -> Result<(), SessionError> {
        let bytes = self.codec.encode(message_type, payload)?;
        debug!(
            device = %self.device.name,
            message_type = %message_type,
            len = bytes.len(),
            "sending frame"
        );
        self.transport
            .write(&self.device.id, self.config.write_characteristic, &bytes)
            .await?;
        Ok(())
    }

    /// Route one streamed frame; unclaimed notifications are published in order
    async fn deliver(&mut self, frame: Frame) {
        match self.router.route(frame) {
            Routed::Delivered => {}
            Routed::Unclaimed(frame) if frame.message_type() == MessageType::Notification => {
                match decode_notification(frame.payload()) {
                    Ok(notification) => self.publish(notification).await,
                    Err(e) => {
                        warn!(device = %self.device.name, error = %e, "skipping notification")
                    }
                }
            }
            Routed::Unclaimed(frame) => self.drop_unclaimed(&frame),
        }
    }

    fn drop_unclaimed(&self, frame: &Frame) {
        debug!(
            device = %self.device.name,
            message_type = %frame.message_type(),
            state = %self.state(),
            "dropping unclaimed frame"
        );
    }

    async fn publish(&mut self, notification: Notification) {
        if let Some(tx) = &self.notifications {
            if tx.send(notification).await.is_err() {
                debug!(device = %self.device.name, "notification receiver dropped");
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(device = %self.device.name, from = %previous, to = %state, "session state");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("state", &self.state())
            .field("operating_system", &self.operating_system)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
