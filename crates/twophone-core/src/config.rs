//! Configuration for sessions and the connection orchestrator

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Result, TwophoneError};
use crate::orchestrator::RetryPolicy;
use crate::protocol::{
    FrameCodec, FrameFormat, NOTIFY_CHARACTERISTIC_UUID, PROTOCOL_VERSION, SERVICE_UUID,
    WRITE_CHARACTERISTIC_UUID,
};
use crate::types::OperatingSystem;

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Per-session protocol and timing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Version announced in `CheckVersion`
    pub protocol_version: i32,
    /// Operating system reported to peers
    pub local_os: OperatingSystem,
    /// Width of the frame length field; must match the peer
    pub frame_format: FrameFormat,
    /// Largest accepted frame, header included
    pub max_frame_len: usize,
    /// Upper bound on waiting for one handshake reply
    pub reply_timeout_ms: u64,
    /// Upper bound on connect plus notification subscription
    pub connect_timeout_ms: u64,
    pub service_uuid: Uuid,
    pub write_characteristic: Uuid,
    pub notify_characteristic: Uuid,
    /// Buffered notifications before the session waits on its consumer
    pub notification_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            local_os: OperatingSystem::Ios,
            frame_format: FrameFormat::Compact,
            max_frame_len: u16::MAX as usize,
            reply_timeout_ms: 10_000,
            connect_timeout_ms: 15_000,
            service_uuid: SERVICE_UUID,
            write_characteristic: WRITE_CHARACTERISTIC_UUID,
            notify_characteristic: NOTIFY_CHARACTERISTIC_UUID,
            notification_capacity: 32,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_os(mut self, os: OperatingSystem) -> Self {
        self.local_os = os;
        self
    }

    pub fn with_frame_format(mut self, format: FrameFormat) -> Self {
        self.frame_format = format;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Codec matching this configuration
    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.frame_format).with_max_frame_len(self.max_frame_len)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_frame_len < self.frame_format.header_size() {
            return Err(TwophoneError::config_error(format!(
                "max_frame_len {} is smaller than the {}-byte frame header",
                self.max_frame_len,
                self.frame_format.header_size()
            )));
        }
        if self.max_frame_len > self.frame_format.max_total_length() {
            return Err(TwophoneError::config_error(format!(
                "max_frame_len {} exceeds what a {:?} length field can express",
                self.max_frame_len, self.frame_format
            )));
        }
        if self.reply_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(TwophoneError::config_error("timeouts must be non-zero"));
        }
        if self.notification_capacity == 0 {
            return Err(TwophoneError::config_error(
                "notification_capacity must be at least 1",
            ));
        }
        if self.write_characteristic == self.notify_characteristic {
            return Err(TwophoneError::config_error(
                "write and notify characteristics must differ",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Orchestrator Configuration
// ----------------------------------------------------------------------------

/// Settings for the connection orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub session: SessionConfig,
    pub retry: RetryPolicy,
    /// Delay before scanning again after the transport ended a scan on its own
    pub rescan_delay_ms: u64,
    /// How long shutdown waits for sessions to close
    pub shutdown_timeout_ms: u64,
    /// Buffer size for handle-to-orchestrator commands
    pub command_buffer_size: usize,
    /// Buffer size for event and notification broadcasts
    pub event_buffer_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            retry: RetryPolicy::default(),
            rescan_delay_ms: 2_000,
            shutdown_timeout_ms: 5_000,
            command_buffer_size: 32,
            event_buffer_size: 128,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rescan_delay(mut self, delay: Duration) -> Self {
        self.rescan_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn rescan_delay(&self) -> Duration {
        Duration::from_millis(self.rescan_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        if self.command_buffer_size == 0 || self.event_buffer_size == 0 {
            return Err(TwophoneError::config_error(
                "channel buffer sizes must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SessionConfig::default().validate().is_ok());
        assert!(OrchestratorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_compact_frame_limit() {
        let config = SessionConfig {
            max_frame_len: 70_000,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());

        let extended = config.with_frame_format(FrameFormat::Extended);
        assert!(extended.validate().is_ok());
        assert_eq!(extended.codec().max_frame_len(), 70_000);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"local_os":"android","reply_timeout_ms":500}"#).unwrap();
        assert_eq!(config.local_os, OperatingSystem::Android);
        assert_eq!(config.reply_timeout(), Duration::from_millis(500));
        assert_eq!(config.frame_format, FrameFormat::Compact);
        assert_eq!(config.service_uuid, SERVICE_UUID);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = SessionConfig::default().with_reply_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(TwophoneError::Configuration { .. })
        ));
    }
}
