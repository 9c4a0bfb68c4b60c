use std::io;
use std::net::SocketAddr;

use protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unable to reach server at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Join refused, carries the server's reply text
    #[error("{0}")]
    Rejected(String),

    #[error("server closed the connection")]
    Closed,

    #[error(transparent)]
    Transport(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// How an active chat session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// User typed the exit token or closed its input
    Exited,
    /// Interrupt signal while the session was running
    Interrupted,
    ServerShutdown,
    ConnectionLost,
}
