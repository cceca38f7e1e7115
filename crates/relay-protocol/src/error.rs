use thiserror::Error;

use crate::header::MAX_PAYLOAD_LEN;

/// Violations of the frame contract detected while decoding a header.
///
/// Any of these is terminal for the connection that produced the bytes; the
/// stream offset can no longer be trusted once a header fails to decode.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("unsupported protocol version {0} (expected 1)")]
    BadVersion(u16),
    #[error("payload length {0} exceeds the {MAX_PAYLOAD_LEN}-byte limit")]
    PayloadTooLarge(u32),
}
