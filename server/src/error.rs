use std::io;

use protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Join rejected, the name is held by another participant
    #[error("name '{0}' is already taken")]
    NameConflict(String),

    /// Peer closed the connection before sending its name
    #[error("connection closed before join request")]
    NoJoinRequest,

    /// Join arrived after the operator started shutdown
    #[error("server is shutting down")]
    ShuttingDown,

    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
}
