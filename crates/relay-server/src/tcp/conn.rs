use std::{
    io::{self, IoSlice, Read, Write},
    net::SocketAddr,
};

use mio::Registry;
use relay_protocol::{FrameHeader, FramingError, HEADER_SIZE};
use tracing::{debug, error, info, warn};

/// Whether a connection is still usable after an operation.
///
/// `Closed` means the event loop must deregister and drop it; the close
/// reason has already been logged at the point of detection.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ConnState {
    Alive,
    Closed,
}

/// One step of the read loop, as seen by the event loop.
pub(crate) enum Step {
    /// A full frame was assembled; the payload buffer is handed over.
    Frame(FrameHeader, Vec<u8>),
    /// The socket is drained; wait for the next readiness event.
    Idle,
    Closed,
}

/// Outcome of pulling bytes from the socket into the decoder.
enum ReadStep {
    Frame(FrameHeader, Vec<u8>),
    WouldBlock,
    PeerClosed,
    Malformed(FramingError),
    Failed(io::Error),
}

enum RxState {
    /// Accumulating the fixed 12-byte header.
    Header { buf: [u8; HEADER_SIZE], have: usize },
    /// Accumulating `header.payload_len` payload bytes. The buffer is
    /// allocated at exactly that size when the header decodes; zero-length
    /// frames never enter this state.
    Payload { header: FrameHeader, buf: Vec<u8>, have: usize },
}

impl RxState {
    fn idle() -> Self {
        Self::Header { buf: [0; HEADER_SIZE], have: 0 }
    }
}

/// Incremental frame decoder.
///
/// Pulls bytes from any non-blocking `Read` source and steps the
/// header/payload state machine, preserving partial progress across
/// `WouldBlock`. After a malformed header it consumes nothing further.
struct FrameDecoder {
    state: RxState,
}

impl FrameDecoder {
    fn new() -> Self {
        Self { state: RxState::idle() }
    }

    /// Advances until one frame completes, the source would block, or the
    /// stream dies. Back-to-back frames in the source are surfaced one
    /// `advance` call at a time without losing buffered bytes in between.
    fn advance(&mut self, src: &mut impl Read) -> ReadStep {
        loop {
            match &mut self.state {
                RxState::Header { buf, have } => {
                    while *have < HEADER_SIZE {
                        match src.read(&mut buf[*have..]) {
                            Ok(0) => return ReadStep::PeerClosed,
                            Ok(n) => *have += n,
                            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                                return ReadStep::WouldBlock;
                            }
                            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                            Err(err) => return ReadStep::Failed(err),
                        }
                    }

                    match FrameHeader::decode(buf) {
                        Ok(header) if header.payload_len == 0 => {
                            self.state = RxState::idle();
                            return ReadStep::Frame(header, Vec::new());
                        }
                        Ok(header) => {
                            self.state = RxState::Payload {
                                buf: vec![0; header.payload_len as usize],
                                have: 0,
                                header,
                            };
                        }
                        Err(err) => return ReadStep::Malformed(err),
                    }
                }

                RxState::Payload { header, buf, have } => {
                    while *have < buf.len() {
                        match src.read(&mut buf[*have..]) {
                            Ok(0) => return ReadStep::PeerClosed,
                            Ok(n) => *have += n,
                            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                                return ReadStep::WouldBlock;
                            }
                            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                            Err(err) => return ReadStep::Failed(err),
                        }
                    }

                    let header = *header;
                    let payload = std::mem::take(buf);
                    self.state = RxState::idle();
                    return ReadStep::Frame(header, payload);
                }
            }
        }
    }
}

/// Per-connection state owned by the event loop.
///
/// Holds the socket and the decode state machine. Never shared: the loop is
/// the only mutator, and command handlers see decoded frames, not buffers.
pub(crate) struct Conn {
    stream: mio::net::TcpStream,
    peer_addr: SocketAddr,
    decoder: FrameDecoder,
}

impl Conn {
    pub(crate) fn new(stream: mio::net::TcpStream, peer_addr: SocketAddr) -> Self {
        Self { stream, peer_addr, decoder: FrameDecoder::new() }
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Attempts to assemble the next frame from the socket.
    ///
    /// The caller loops on this until `Idle`: under edge-triggered readiness
    /// the socket must be drained to `WouldBlock` or the wakeup is lost.
    pub(crate) fn read_frame(&mut self) -> Step {
        match self.decoder.advance(&mut self.stream) {
            ReadStep::Frame(header, payload) => Step::Frame(header, payload),
            ReadStep::WouldBlock => Step::Idle,
            ReadStep::PeerClosed => {
                info!(peer = %self.peer_addr, "peer closed connection");
                Step::Closed
            }
            ReadStep::Malformed(err) => {
                warn!(peer = %self.peer_addr, %err, "framing violation");
                Step::Closed
            }
            ReadStep::Failed(err) => {
                error!(peer = %self.peer_addr, %err, "read failed");
                Step::Closed
            }
        }
    }

    /// Best-effort vectored write of header then payload.
    ///
    /// Responses are expected to fit in the kernel send buffer; a short
    /// write or `WouldBlock` drops the connection rather than queueing.
    pub(crate) fn send_frame(&mut self, header: &FrameHeader, payload: &[u8]) -> ConnState {
        let header_bytes = header.encode();
        let total = HEADER_SIZE + payload.len();

        loop {
            match self
                .stream
                .write_vectored(&[IoSlice::new(&header_bytes), IoSlice::new(payload)])
            {
                Ok(n) if n == total => return ConnState::Alive,
                Ok(n) => {
                    warn!(
                        peer = %self.peer_addr,
                        wrote = n,
                        expected = total,
                        "short write, dropping connection"
                    );
                    return ConnState::Closed;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    warn!(peer = %self.peer_addr, "send buffer full, dropping connection");
                    return ConnState::Closed;
                }
                Err(err) => {
                    warn!(peer = %self.peer_addr, %err, "write failed");
                    return ConnState::Closed;
                }
            }
        }
    }

    /// Deregister before shutdown so a stale event dequeued later cannot
    /// refer to a reused fd.
    pub(crate) fn close(&mut self, registry: &Registry) {
        debug!(peer = %self.peer_addr, "terminating connection");
        let _ = registry.deregister(&mut self.stream);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}
