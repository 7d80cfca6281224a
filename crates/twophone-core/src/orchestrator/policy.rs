//! Retry policy applied when a session ends

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{FailureKind, SessionError};
use crate::session::SessionOutcome;

/// Which session endings put the device name back on the desired list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Failure kinds that are requeued
    pub retryable: BTreeSet<FailureKind>,
    /// Requeue when a streaming link drops
    pub requeue_on_link_loss: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retryable: [
                FailureKind::VersionMismatch,
                FailureKind::DeviceUnregistered,
                FailureKind::IllegalOperatingSystem,
                FailureKind::MalformedPayload,
                FailureKind::Timeout,
                FailureKind::LinkLost,
                FailureKind::ConnectFailed,
            ]
            .into_iter()
            .collect(),
            requeue_on_link_loss: false,
        }
    }
}

impl RetryPolicy {
    /// Never requeue anything
    pub fn never() -> Self {
        Self {
            retryable: BTreeSet::new(),
            requeue_on_link_loss: false,
        }
    }

    pub fn with_requeue_on_link_loss(mut self, enabled: bool) -> Self {
        self.requeue_on_link_loss = enabled;
        self
    }

    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        kind != FailureKind::Cancelled && self.retryable.contains(&kind)
    }

    /// Decide for a session that ended without a local disconnect request
    pub fn should_requeue(&self, result: &Result<SessionOutcome, SessionError>) -> bool {
        match result {
            Ok(SessionOutcome::LinkLost) => self.requeue_on_link_loss,
            Ok(SessionOutcome::Forgotten | SessionOutcome::Cancelled | SessionOutcome::Shutdown) => {
                false
            }
            Err(error) => self.is_retryable(error.kind()),
        }
    }
}
