//! Routing of inbound frames to handshake waiters by message type

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::errors::SessionError;
use crate::protocol::{Frame, MessageType};

/// Result of routing one frame
#[derive(Debug)]
pub enum Routed {
    /// A waiter for the frame's type took it
    Delivered,
    /// Nobody was waiting; the caller decides what to do with it
    Unclaimed(Frame),
}

/// At most one pending completion slot per message type
#[derive(Debug, Default)]
pub struct FrameRouter {
    waiters: HashMap<MessageType, oneshot::Sender<Frame>>,
}

impl FrameRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next frame of `message_type`
    ///
    /// A waiter whose receiver was dropped does not count as registered.
    pub fn register(
        &mut self,
        message_type: MessageType,
    ) -> Result<oneshot::Receiver<Frame>, SessionError> {
        if let Some(existing) = self.waiters.get(&message_type) {
            if !existing.is_closed() {
                return Err(SessionError::DuplicateWaiter { message_type });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.insert(message_type, tx);
        Ok(rx)
    }

    pub fn cancel(&mut self, message_type: MessageType) {
        self.waiters.remove(&message_type);
    }

    pub fn is_waiting(&self, message_type: MessageType) -> bool {
        self.waiters
            .get(&message_type)
            .is_some_and(|waiter| !waiter.is_closed())
    }

    pub fn route(&mut self, frame: Frame) -> Routed {
        match self.waiters.remove(&frame.message_type()) {
            Some(waiter) => match waiter.send(frame) {
                Ok(()) => Routed::Delivered,
                Err(frame) => Routed::Unclaimed(frame),
            },
            None => Routed::Unclaimed(frame),
        }
    }

    /// Drop every waiter; pending receivers observe a closed channel
    pub fn clear(&mut self) {
        self.waiters.clear();
    }
}
