use std::{io, net::SocketAddr};

use thiserror::Error;

/// Failures that prevent the server from starting or keep the loop from
/// waiting on events. Connection-scoped errors never surface here; the loop
/// contains them to the connection that caused them.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("couldn't create the poll instance: {0}")]
    PollCreate(#[source] io::Error),
    #[error("couldn't bind and listen on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("couldn't register the listener for readiness: {0}")]
    Register(#[source] io::Error),
    #[error("waiting for readiness events failed: {0}")]
    PollWait(#[source] io::Error),
}
