use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors that prevent the webhook listener from starting.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// No bind address was configured and none could be discovered.
    #[error("no local address to bind to")]
    NoLocalAddress(#[source] io::Error),

    /// The socket could not be bound, typically because the port is in use.
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The bound socket could not report its address.
    #[error("listener socket error")]
    Io(#[from] io::Error),
}
