//! Payload bodies carried inside frames
//!
//! Handshake and notification bodies are JSON objects with camelCase keys; the
//! version request and OS negotiation use fixed binary layouts.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

use crate::errors::SessionError;
use crate::protocol::MessageType;
use crate::types::{Notification, OperatingSystem};

const EMPTY_TITLE: &str = "empty title";
const EMPTY_BODY: &str = "empty body";

// ----------------------------------------------------------------------------
// Handshake Bodies
// ----------------------------------------------------------------------------

/// Reply to `CheckVersion`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionReply {
    pub version_matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Body of an outbound `CheckDevice`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCheckRequest {
    pub uuid: String,
    pub os: u8,
}

/// Reply to `CheckDevice`; `os` absent means a separate negotiation step follows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCheckReply {
    pub valid_device: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<u8>,
}

/// Body of a `Notification` frame as sent by the peer
///
/// A field that is missing or not a string reads as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| value.as_str().map(str::to_string)))
}

impl From<NotificationPayload> for Notification {
    fn from(payload: NotificationPayload) -> Self {
        Notification {
            title: payload.title.unwrap_or_else(|| EMPTY_TITLE.to_string()),
            body: payload.text.unwrap_or_else(|| EMPTY_BODY.to_string()),
        }
    }
}

impl From<&Notification> for NotificationPayload {
    fn from(notification: &Notification) -> Self {
        NotificationPayload {
            title: Some(notification.title.clone()),
            text: Some(notification.body.clone()),
        }
    }
}

// ----------------------------------------------------------------------------
// Encoding Helpers
// ----------------------------------------------------------------------------

/// `CheckVersion` request body: the local version as `i32` LE
pub fn version_request(version: i32) -> Vec<u8> {
    version.to_le_bytes().to_vec()
}

pub fn parse_version_request(payload: &[u8]) -> Result<i32, SessionError> {
    let bytes: [u8; 4] = payload.try_into().map_err(|_| {
        SessionError::malformed(
            MessageType::CheckVersion,
            format!("expected 4 version bytes, got {}", payload.len()),
        )
    })?;
    Ok(i32::from_le_bytes(bytes))
}

/// `CheckOperatingSystem` body: one tag byte
pub fn os_tag_payload(os: OperatingSystem) -> Vec<u8> {
    vec![os.tag()]
}

pub fn parse_os_tag(payload: &[u8]) -> Result<OperatingSystem, SessionError> {
    match payload {
        [tag] => OperatingSystem::try_from(*tag),
        _ => Err(SessionError::malformed(
            MessageType::CheckOperatingSystem,
            format!("expected 1 tag byte, got {}", payload.len()),
        )),
    }
}

pub fn encode_json<T: Serialize>(message_type: MessageType, body: &T) -> Result<Vec<u8>, SessionError> {
    serde_json::to_vec(body).map_err(|e| SessionError::malformed(message_type, e.to_string()))
}

pub fn decode_json<T: DeserializeOwned>(
    message_type: MessageType,
    payload: &[u8],
) -> Result<T, SessionError> {
    serde_json::from_slice(payload).map_err(|e| SessionError::malformed(message_type, e.to_string()))
}

/// Decode a notification body, filling in placeholder text for missing fields
pub fn decode_notification(payload: &[u8]) -> Result<Notification, SessionError> {
    decode_json::<NotificationPayload>(MessageType::Notification, payload).map(Notification::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_reply_wire_names() {
        let reply: VersionReply =
            serde_json::from_str(r#"{"versionMatched":true,"sessionId":"abc"}"#).unwrap();
        assert!(reply.version_matched);
        assert_eq!(reply.session_id.as_deref(), Some("abc"));

        let bare: VersionReply = serde_json::from_str(r#"{"versionMatched":false}"#).unwrap();
        assert_eq!(bare.session_id, None);
    }

    #[test]
    fn test_device_check_request_shape() {
        let body = encode_json(
            MessageType::CheckDevice,
            &DeviceCheckRequest {
                uuid: "TOKEN".to_string(),
                os: OperatingSystem::Ios.tag(),
            },
        )
        .unwrap();
        assert_eq!(body, br#"{"uuid":"TOKEN","os":1}"#);
    }

    #[test]
    fn test_device_check_reply_without_os() {
        let reply: DeviceCheckReply =
            decode_json(MessageType::CheckDevice, br#"{"validDevice":true}"#).unwrap();
        assert!(reply.valid_device);
        assert_eq!(reply.os, None);
    }

    #[test]
    fn test_notification_defaults() {
        let notification = decode_notification(br#"{"title":"Hello"}"#).unwrap();
        assert_eq!(notification.title, "Hello");
        assert_eq!(notification.body, "empty body");

        let empty = decode_notification(b"{}").unwrap();
        assert_eq!(empty.title, "empty title");
    }

    #[test]
    fn test_notification_non_string_fields_use_defaults() {
        let notification = decode_notification(br#"{"title":42,"text":null}"#).unwrap();
        assert_eq!(notification.title, "empty title");
        assert_eq!(notification.body, "empty body");

        let nested = decode_notification(br#"{"title":"Mail","text":{"unread":3}}"#).unwrap();
        assert_eq!(nested.title, "Mail");
        assert_eq!(nested.body, "empty body");
    }

    #[test]
    fn test_notification_garbage_is_malformed() {
        assert!(matches!(
            decode_notification(b"not json"),
            Err(SessionError::MalformedPayload {
                message_type: MessageType::Notification,
                ..
            })
        ));
    }

    #[test]
    fn test_version_request_bytes() {
        assert_eq!(version_request(1), vec![1, 0, 0, 0]);
        assert_eq!(parse_version_request(&[2, 0, 0, 0]).unwrap(), 2);
        assert!(parse_version_request(&[1, 0]).is_err());
    }

    #[test]
    fn test_os_tag_parsing() {
        assert_eq!(parse_os_tag(&[0]).unwrap(), OperatingSystem::Android);
        assert!(matches!(
            parse_os_tag(&[9]),
            Err(SessionError::IllegalOperatingSystem { tag: 9 })
        ));
        assert!(matches!(
            parse_os_tag(&[]),
            Err(SessionError::MalformedPayload { .. })
        ));
    }
}
