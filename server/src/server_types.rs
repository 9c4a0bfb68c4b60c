use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::names::Roster;

// server type definitions

pub type ClientId = u64;

// queue feeding a stream participant's writer task
pub type Outbound = mpsc::Sender<String>;

// current stream client registry data, guarded for mutation and fan out
pub type Registry = Arc<Mutex<Roster<ClientId, Outbound>>>;

/// Why a stream participant's relay loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// Participant sent the exit token, others were told it left
    Exited,
    /// Read failed or the peer went away; removed without a leave notice
    TransportFailure,
    /// Operator shut the server down
    Shutdown,
}

/// What the datagram receive loop did with one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Joined,
    Rejected,
    Left,
    Relayed,
    Dropped,
}
