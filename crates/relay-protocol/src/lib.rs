//! Wire format shared by the relay server and its clients.
//!
//! A frame is a fixed 12-byte header followed by `payload_len` opaque bytes.
//! All multi-byte header fields travel big-endian. The codec here is pure:
//! no sockets, no buffers beyond the 12 header bytes.

mod error;
mod header;
mod kind;

pub use error::FramingError;
pub use header::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_LEN, PROTOCOL_VERSION};
pub use kind::MessageKind;
