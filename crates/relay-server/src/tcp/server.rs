use std::{io, net::SocketAddr, time::Duration};

use mio::{Events, Interest, Poll, Token, net::TcpListener};
use relay_protocol::FrameHeader;
use tracing::{debug, error, info, warn};

use crate::{
    ServerError, ShutdownFlag,
    dispatch::{Dispatch, Handler},
    tcp::conn::{Conn, ConnState, Step},
};

/// Upper bound on how long a quiet loop turn waits before re-checking the
/// shutdown flag. A delivered signal also interrupts the wait early.
const POLL_TIMEOUT: Duration = Duration::from_millis(200);

const EVENT_CAPACITY: usize = 128;

/// Everything registered with the poll, tagged by token.
enum Slot {
    Listener(TcpListener),
    Client(Conn),
}

/// Registration table plus the pieces that mutate it. Split out from
/// [`Server`] so events can be iterated while slots are being reshuffled.
struct ServerCore<H> {
    poll: Poll,
    slots: Vec<(Token, Slot)>,
    next_token: usize,
    handler: H,
}

impl<H: Handler> ServerCore<H> {
    fn handle_event(&mut self, token: Token) {
        let Some(index) = self.slots.iter().position(|(t, _)| *t == token) else {
            // A slot closed earlier in this batch can still have an event
            // queued behind it.
            debug!(?token, "event for a token that is no longer registered");
            return;
        };

        let is_listener = matches!(self.slots[index].1, Slot::Listener(_));
        if is_listener {
            self.accept_batch(index);
        } else {
            self.drain_client(index);
        }
    }

    /// Accepts until the kernel has no more pending connections. Under
    /// edge-triggered readiness stopping early would strand the remainder.
    fn accept_batch(&mut self, listener_index: usize) {
        loop {
            let Slot::Listener(listener) = &mut self.slots[listener_index].1 else {
                return;
            };
            match listener.accept() {
                Ok((stream, peer_addr)) => self.register_client(stream, peer_addr),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    // Transient accept failures end the batch but never the
                    // loop; the listener stays registered.
                    error!(%err, "accept failed");
                    return;
                }
            }
        }
    }

    fn register_client(&mut self, mut stream: mio::net::TcpStream, peer_addr: SocketAddr) {
        if let Err(err) = stream.set_nodelay(true) {
            warn!(peer = %peer_addr, %err, "couldn't configure client socket");
            return;
        }

        let token = Token(self.next_token);
        if let Err(err) = self.poll.registry().register(&mut stream, token, Interest::READABLE) {
            // Fatal for this client only.
            error!(peer = %peer_addr, %err, "couldn't register client");
            let _ = stream.shutdown(std::net::Shutdown::Both);
            return;
        }

        self.next_token += 1;
        info!(peer = %peer_addr, ?token, "client connected");
        self.slots.push((token, Slot::Client(Conn::new(stream, peer_addr))));
    }

    /// Reads frames until the socket would block, dispatching each one
    /// synchronously. Back-to-back frames arriving in one readiness event
    /// are all handled here before the loop polls again.
    fn drain_client(&mut self, index: usize) {
        loop {
            let Slot::Client(conn) = &mut self.slots[index].1 else {
                return;
            };
            match conn.read_frame() {
                Step::Frame(header, payload) => {
                    if self.respond(index, &header, &payload) == ConnState::Closed {
                        self.close_at(index);
                        return;
                    }
                }
                Step::Idle => return,
                Step::Closed => {
                    self.close_at(index);
                    return;
                }
            }
        }
    }

    fn respond(&mut self, index: usize, header: &FrameHeader, payload: &[u8]) -> ConnState {
        let plan = self.handler.handle(header, payload);
        let Slot::Client(conn) = &mut self.slots[index].1 else {
            return ConnState::Closed;
        };
        match plan {
            Dispatch::Reply { kind, payload: body } => {
                let reply = FrameHeader::new(kind, header.sequence, body.len() as u32);
                conn.send_frame(&reply, &body)
            }
            Dispatch::NoReply => ConnState::Alive,
            Dispatch::Close => {
                info!(peer = %conn.peer(), "handler requested close");
                ConnState::Closed
            }
        }
    }

    fn close_at(&mut self, index: usize) {
        let (token, slot) = self.slots.swap_remove(index);
        match slot {
            Slot::Client(mut conn) => {
                debug!(?token, "releasing connection slot");
                conn.close(self.poll.registry());
            }
            Slot::Listener(mut listener) => {
                let _ = self.poll.registry().deregister(&mut listener);
            }
        }
    }

    /// Closes every client, then the listener. Called exactly once per run,
    /// whether the loop ends by shutdown flag or by poll failure.
    fn teardown(&mut self) {
        let open = self.slots.iter().filter(|(_, s)| matches!(s, Slot::Client(_))).count();
        info!(connections = open, "closing all connections");
        while let Some((_, slot)) = self.slots.pop() {
            match slot {
                Slot::Client(mut conn) => conn.close(self.poll.registry()),
                Slot::Listener(mut listener) => {
                    let _ = self.poll.registry().deregister(&mut listener);
                }
            }
        }
    }
}

/// Single-threaded non-blocking TCP server.
///
/// One thread runs [`run`](Server::run): it multiplexes the listener and
/// every accepted connection through a `mio` poll in edge-triggered fashion,
/// feeds complete frames to the [`Handler`], and writes the handler's
/// replies back on the same turn. Connection-scoped failures (framing,
/// transport, peer close) are contained to their connection; only startup
/// and poll-wait failures surface as [`ServerError`].
///
/// Shutdown is cooperative: raise the [`ShutdownFlag`] (or deliver
/// `SIGINT`/`SIGTERM` when the flag is installed) and the loop tears down
/// every connection and returns.
pub struct Server<H> {
    events: Events,
    core: ServerCore<H>,
    shutdown: ShutdownFlag,
    local_addr: SocketAddr,
}

impl<H: Handler> Server<H> {
    /// Binds and registers the listener. Any failure here is fatal to
    /// startup; the caller should exit non-zero.
    pub fn bind(addr: SocketAddr, handler: H, shutdown: ShutdownFlag) -> Result<Self, ServerError> {
        let poll = Poll::new().map_err(ServerError::PollCreate)?;
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr =
            listener.local_addr().map_err(|source| ServerError::Bind { addr, source })?;

        let token = Token(0);
        poll.registry()
            .register(&mut listener, token, Interest::READABLE)
            .map_err(ServerError::Register)?;

        Ok(Self {
            events: Events::with_capacity(EVENT_CAPACITY),
            core: ServerCore {
                poll,
                slots: vec![(token, Slot::Listener(listener))],
                next_token: 1,
                handler,
            },
            shutdown,
            local_addr,
        })
    }

    /// The address the listener actually bound, with the kernel-assigned
    /// port resolved when binding to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the event loop until the shutdown flag is raised or polling
    /// fails. All connections are closed before returning, on both paths.
    pub fn run(&mut self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, "listening");

        while !self.shutdown.is_raised() {
            if let Err(err) = self.core.poll.poll(&mut self.events, Some(POLL_TIMEOUT)) {
                if err.kind() == io::ErrorKind::Interrupted {
                    // A signal landed mid-wait; the flag check decides.
                    continue;
                }
                self.core.teardown();
                return Err(ServerError::PollWait(err));
            }

            for event in self.events.iter() {
                self.core.handle_event(event.token());
            }
        }

        info!("shutdown requested");
        self.core.teardown();
        Ok(())
    }
}
