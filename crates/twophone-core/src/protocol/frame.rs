//! Length-prefixed frame codec and streaming reassembly
//!
//! Wire layout (all fields little-endian):
//!
//! ```text
//! +----------------------+-------------------+---------------------------+
//! | length (u16 or u32)  | message type (u16) | payload (length - header) |
//! +----------------------+-------------------+---------------------------+
//! ```
//!
//! `length` counts the whole frame, header included. The width of the length
//! field is fixed by [`FrameFormat`] and must match the peer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::CodecError;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Size of the message type field
pub const MESSAGE_TYPE_SIZE: usize = 2;

/// Default cap for extended-format frames
pub const DEFAULT_EXTENDED_MAX_FRAME_LEN: usize = 1024 * 1024;

// ----------------------------------------------------------------------------
// Message Types
// ----------------------------------------------------------------------------

/// Closed set of frame types understood by both peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageType {
    CheckVersion,
    CheckDevice,
    ClearDevice,
    CheckOperatingSystem,
    Notification,
}

impl MessageType {
    pub const fn code(self) -> u16 {
        match self {
            MessageType::CheckVersion => 0x0000,
            MessageType::CheckDevice => 0x0001,
            MessageType::ClearDevice => 0x0002,
            MessageType::CheckOperatingSystem => 0x0003,
            MessageType::Notification => 0x0010,
        }
    }
}

impl TryFrom<u16> for MessageType {
    type Error = CodecError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            0x0000 => Ok(MessageType::CheckVersion),
            0x0001 => Ok(MessageType::CheckDevice),
            0x0002 => Ok(MessageType::ClearDevice),
            0x0003 => Ok(MessageType::CheckOperatingSystem),
            0x0010 => Ok(MessageType::Notification),
            message_type => Err(CodecError::UnknownMessageType { message_type }),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::CheckVersion => write!(f, "CheckVersion"),
            MessageType::CheckDevice => write!(f, "CheckDevice"),
            MessageType::ClearDevice => write!(f, "ClearDevice"),
            MessageType::CheckOperatingSystem => write!(f, "CheckOperatingSystem"),
            MessageType::Notification => write!(f, "Notification"),
        }
    }
}

// ----------------------------------------------------------------------------
// Frame Format
// ----------------------------------------------------------------------------

/// Width of the length field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// 2-byte length, 4-byte header
    #[default]
    Compact,
    /// 4-byte length, 6-byte header
    Extended,
}

impl FrameFormat {
    pub const fn length_size(self) -> usize {
        match self {
            FrameFormat::Compact => 2,
            FrameFormat::Extended => 4,
        }
    }

    pub const fn header_size(self) -> usize {
        self.length_size() + MESSAGE_TYPE_SIZE
    }

    /// Largest total length the length field can express
    pub const fn max_total_length(self) -> usize {
        match self {
            FrameFormat::Compact => u16::MAX as usize,
            FrameFormat::Extended => u32::MAX as usize,
        }
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One parsed or to-be-sent wire unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    message_type: MessageType,
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

// ----------------------------------------------------------------------------
// Frame Codec
// ----------------------------------------------------------------------------

/// Stateless encoder/decoder for one frame format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    format: FrameFormat,
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(FrameFormat::default())
    }
}

impl FrameCodec {
    pub fn new(format: FrameFormat) -> Self {
        let max_frame_len = match format {
            FrameFormat::Compact => format.max_total_length(),
            FrameFormat::Extended => DEFAULT_EXTENDED_MAX_FRAME_LEN,
        };
        Self {
            format,
            max_frame_len,
        }
    }

    /// Cap the total frame length, clamped to what the format can express
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len
            .max(self.format.header_size())
            .min(self.format.max_total_length());
        self
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Encode a frame with `total_length = header_size + payload.len()`
    pub fn encode(&self, message_type: MessageType, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        let total = self.format.header_size() + payload.len();
        if total > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                size: total,
                max_size: self.max_frame_len,
            });
        }

        let mut bytes = Vec::with_capacity(total);
        match self.format {
            FrameFormat::Compact => bytes.extend_from_slice(&(total as u16).to_le_bytes()),
            FrameFormat::Extended => bytes.extend_from_slice(&(total as u32).to_le_bytes()),
        }
        bytes.extend_from_slice(&message_type.code().to_le_bytes());
        bytes.extend_from_slice(payload);
        Ok(bytes)
    }

    pub fn encode_frame(&self, frame: &Frame) -> Result<Vec<u8>, CodecError> {
        self.encode(frame.message_type, &frame.payload)
    }

    /// Try to parse one frame from the front of `buffer`
    ///
    /// Returns `Ok(None)` while the buffer is shorter than the length field or
    /// than the declared frame length; nothing is consumed in that case.
    pub fn decode(&self, buffer: &[u8]) -> Result<Option<(Frame, usize)>, CodecError> {
        let length_size = self.format.length_size();
        let header_size = self.format.header_size();

        if buffer.len() < length_size {
            return Ok(None);
        }

        let declared = self.read_length(&buffer[..length_size])?;
        if declared < header_size {
            return Err(CodecError::MalformedFrame {
                declared,
                header_size,
            });
        }
        if declared > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                size: declared,
                max_size: self.max_frame_len,
            });
        }
        if buffer.len() < declared {
            return Ok(None);
        }

        let type_bytes: [u8; MESSAGE_TYPE_SIZE] = buffer[length_size..header_size]
            .try_into()
            .map_err(|_| CodecError::MalformedLength {
                reason: "message type field truncated".to_string(),
            })?;
        let message_type = MessageType::try_from(u16::from_le_bytes(type_bytes))?;
        let payload = buffer[header_size..declared].to_vec();

        Ok(Some((Frame::new(message_type, payload), declared)))
    }

    fn read_length(&self, field: &[u8]) -> Result<usize, CodecError> {
        let malformed = |_| CodecError::MalformedLength {
            reason: format!("expected {} length bytes, got {}", self.format.length_size(), field.len()),
        };
        match self.format {
            FrameFormat::Compact => {
                let bytes: [u8; 2] = field.try_into().map_err(malformed)?;
                Ok(u16::from_le_bytes(bytes) as usize)
            }
            FrameFormat::Extended => {
                let bytes: [u8; 4] = field.try_into().map_err(malformed)?;
                Ok(u32::from_le_bytes(bytes) as usize)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Reassembly Buffer
// ----------------------------------------------------------------------------

/// Per-session accumulation buffer for transport chunks
///
/// Everything decodable is decoded as soon as it arrives, so the buffer only
/// ever holds the trailing bytes of one partial frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    codec: FrameCodec,
    buffer: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            codec,
            buffer: Vec::new(),
        }
    }

    /// Append a transport chunk without decoding
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Decode the next complete frame, removing its bytes from the front
    pub fn next_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        match self.codec.decode(&self.buffer)? {
            Some((frame, consumed)) => {
                self.buffer.drain(..consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Append a chunk and decode every frame it completes, in arrival order
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, CodecError> {
        self.extend(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of buffered, not yet framed bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered bytes and release the allocation
    pub fn clear(&mut self) {
        self.buffer = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_encoding_layout() {
        let codec = FrameCodec::new(FrameFormat::Compact);
        let bytes = codec.encode(MessageType::Notification, b"hi").unwrap();
        assert_eq!(bytes, vec![0x06, 0x00, 0x10, 0x00, b'h', b'i']);
    }

    #[test]
    fn test_extended_encoding_layout() {
        let codec = FrameCodec::new(FrameFormat::Extended);
        let bytes = codec.encode(MessageType::CheckDevice, &[0x01]).unwrap();
        assert_eq!(bytes, vec![0x07, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_round_trip_consumes_whole_frame() {
        for format in [FrameFormat::Compact, FrameFormat::Extended] {
            let codec = FrameCodec::new(format);
            let bytes = codec.encode(MessageType::CheckVersion, &[1, 0, 0, 0]).unwrap();
            let (frame, consumed) = codec.decode(&bytes).unwrap().unwrap();
            assert_eq!(frame, Frame::new(MessageType::CheckVersion, vec![1, 0, 0, 0]));
            assert_eq!(consumed, bytes.len());
        }
    }

    #[test]
    fn test_empty_payload() {
        let codec = FrameCodec::default();
        let bytes = codec.encode(MessageType::ClearDevice, &[]).unwrap();
        assert_eq!(bytes.len(), 4);
        let (frame, consumed) = codec.decode(&bytes).unwrap().unwrap();
        assert!(frame.payload().is_empty());
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_incomplete_buffers() {
        let codec = FrameCodec::default();
        let bytes = codec.encode(MessageType::Notification, b"payload").unwrap();

        assert_eq!(codec.decode(&[]).unwrap(), None);
        assert_eq!(codec.decode(&bytes[..1]).unwrap(), None);
        for end in 2..bytes.len() {
            assert_eq!(codec.decode(&bytes[..end]).unwrap(), None);
        }
    }

    #[test]
    fn test_unknown_message_type() {
        let codec = FrameCodec::default();
        let bytes = [0x04, 0x00, 0xFF, 0xFF];
        assert_eq!(
            codec.decode(&bytes),
            Err(CodecError::UnknownMessageType {
                message_type: 0xFFFF
            })
        );
    }

    #[test]
    fn test_declared_length_below_header() {
        let codec = FrameCodec::default();
        assert!(matches!(
            codec.decode(&[0x03, 0x00, 0x00, 0x00]),
            Err(CodecError::MalformedFrame {
                declared: 3,
                header_size: 4
            })
        ));
    }

    #[test]
    fn test_frame_too_large() {
        let codec = FrameCodec::default().with_max_frame_len(16);
        assert!(matches!(
            codec.encode(MessageType::Notification, &[0u8; 13]),
            Err(CodecError::FrameTooLarge { size: 17, max_size: 16 })
        ));
        // Reported before the whole frame has arrived
        assert!(matches!(
            codec.decode(&[0x20, 0x00]),
            Err(CodecError::FrameTooLarge { size: 32, max_size: 16 })
        ));
    }

    #[test]
    fn test_frame_buffer_splits_and_joins() {
        let codec = FrameCodec::default();
        let mut stream = codec.encode(MessageType::CheckDevice, b"{}").unwrap();
        stream.extend(codec.encode(MessageType::Notification, b"abc").unwrap());

        let mut buffer = FrameBuffer::new(codec);
        assert!(buffer.push(&stream[..3]).unwrap().is_empty());
        assert_eq!(buffer.len(), 3);

        let frames = buffer.push(&stream[3..]).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].message_type(), MessageType::CheckDevice);
        assert_eq!(frames[1].payload(), b"abc");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_frame_buffer_keeps_only_partial_tail() {
        let codec = FrameCodec::default();
        let mut stream = codec.encode(MessageType::Notification, b"first").unwrap();
        let second = codec.encode(MessageType::Notification, b"second").unwrap();
        stream.extend_from_slice(&second[..5]);

        let mut buffer = FrameBuffer::new(codec);
        let frames = buffer.push(&stream).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.len(), 5);

        buffer.clear();
        assert!(buffer.is_empty());
    }
}
