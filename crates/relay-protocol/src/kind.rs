use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Command codes carried in the header's `message_type` field.
///
/// The set is open: a header with a code outside this enum still decodes
/// (the codec treats `message_type` as an opaque `u16`), and the dispatcher
/// decides what to do with a kind it cannot classify.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Keep-alive probe; never answered.
    Heartbeat = 0x01,
    /// Application data; the server echoes it back.
    Data = 0x02,
    /// Positive acknowledgement.
    Ack = 0x03,
    /// Error report. Reserved: the server never emits it unilaterally.
    Error = 0xFF,
}
