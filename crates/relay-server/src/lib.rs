//! Single-threaded framed TCP command server.
//!
//! The [`tcp::Server`] runs an edge-triggered readiness loop over a listener
//! and all accepted connections. Each connection owns a byte-oriented decode
//! state machine that survives partial reads; complete frames are handed to
//! a [`Handler`] and its replies written back on the same loop turn.

pub mod dispatch;
mod error;
mod shutdown;
pub mod tcp;

pub use dispatch::{Dispatch, EchoHandler, Handler};
pub use error::ServerError;
pub use shutdown::ShutdownFlag;
pub use tcp::Server;
