use relay_protocol::{FrameHeader, MessageKind};
use tracing::warn;

/// What the event loop should do with a frame once a handler has seen it.
pub enum Dispatch {
    /// Send a response frame. The loop builds the header itself, echoing
    /// the request's sequence number.
    Reply { kind: MessageKind, payload: Vec<u8> },
    NoReply,
    /// Drop the connection after this frame.
    Close,
}

/// Maps one fully decoded frame to a response plan.
///
/// Handlers run synchronously on the loop thread and see only the frame;
/// connection buffers and sockets belong to the loop.
pub trait Handler {
    fn handle(&mut self, header: &FrameHeader, payload: &[u8]) -> Dispatch;
}

/// The built-in command set: echo data, swallow heartbeats.
///
/// Frames with an unrecognized command code are logged at WARN and left
/// unanswered while the connection stays open. A handler that wants the
/// stricter policy returns [`Dispatch::Close`] instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn handle(&mut self, header: &FrameHeader, payload: &[u8]) -> Dispatch {
        match header.kind() {
            Some(MessageKind::Data) => {
                Dispatch::Reply { kind: MessageKind::Data, payload: payload.to_vec() }
            }
            Some(MessageKind::Heartbeat) => Dispatch::NoReply,
            Some(kind @ (MessageKind::Ack | MessageKind::Error)) => {
                warn!(?kind, sequence = header.sequence, "client sent a response-only kind");
                Dispatch::NoReply
            }
            None => {
                warn!(
                    message_type = header.message_type,
                    sequence = header.sequence,
                    "unknown message type"
                );
                Dispatch::NoReply
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frames_echo_verbatim() {
        let mut handler = EchoHandler;
        let header = FrameHeader::data(42, 5);
        match handler.handle(&header, b"Hello") {
            Dispatch::Reply { kind, payload } => {
                assert_eq!(kind, MessageKind::Data);
                assert_eq!(payload, b"Hello");
            }
            _ => panic!("expected a reply"),
        }
    }

    #[test]
    fn heartbeats_are_silent() {
        let mut handler = EchoHandler;
        let header = FrameHeader::heartbeat(7);
        assert!(matches!(handler.handle(&header, b""), Dispatch::NoReply));
    }

    #[test]
    fn unknown_kinds_keep_the_connection_open() {
        let mut handler = EchoHandler;
        let header = FrameHeader { version: 1, message_type: 0x42, sequence: 1, payload_len: 0 };
        assert!(matches!(handler.handle(&header, b""), Dispatch::NoReply));
    }
}
