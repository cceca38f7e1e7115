use crate::{FramingError, MessageKind};

/// Wire size of a frame header. Fixed, no padding.
pub const HEADER_SIZE: usize = 12;
/// Upper bound on `payload_len`; anything larger is a framing violation.
pub const MAX_PAYLOAD_LEN: u32 = 1024;
/// The only protocol version this codec speaks.
pub const PROTOCOL_VERSION: u16 = 1;

/// The fixed 12-byte prefix of every frame.
///
/// Field layout on the wire, all big-endian:
///
/// | offset | width | field |
/// |--------|-------|----------------|
/// | 0      | u16   | `version`      |
/// | 2      | u16   | `message_type` |
/// | 4      | u32   | `sequence`     |
/// | 8      | u32   | `payload_len`  |
///
/// `message_type` stays a raw `u16` here; mapping it onto [`MessageKind`] is
/// the dispatcher's concern so that unknown commands survive decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u16,
    pub message_type: u16,
    pub sequence: u32,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Header for a data/echo frame carrying `payload_len` bytes.
    pub fn data(sequence: u32, payload_len: u32) -> Self {
        Self::new(MessageKind::Data, sequence, payload_len)
    }

    /// Header-only keep-alive frame.
    pub fn heartbeat(sequence: u32) -> Self {
        Self::new(MessageKind::Heartbeat, sequence, 0)
    }

    pub fn new(kind: MessageKind, sequence: u32, payload_len: u32) -> Self {
        Self { version: PROTOCOL_VERSION, message_type: kind.into(), sequence, payload_len }
    }

    /// The header's command code, when it is one we know.
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::try_from(self.message_type).ok()
    }

    /// Serializes into network byte order.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.version.to_be_bytes());
        buf[2..4].copy_from_slice(&self.message_type.to_be_bytes());
        buf[4..8].copy_from_slice(&self.sequence.to_be_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Deserializes from network byte order, enforcing the frame contract.
    ///
    /// Rejects headers whose version is not [`PROTOCOL_VERSION`] or whose
    /// payload length exceeds [`MAX_PAYLOAD_LEN`]. An unrecognized
    /// `message_type` is not a decode error.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self, FramingError> {
        let version = u16::from_be_bytes([buf[0], buf[1]]);
        if version != PROTOCOL_VERSION {
            return Err(FramingError::BadVersion(version));
        }

        let payload_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(FramingError::PayloadTooLarge(payload_len));
        }

        Ok(Self {
            version,
            message_type: u16::from_be_bytes([buf[2], buf[3]]),
            sequence: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            payload_len,
        })
    }
}
