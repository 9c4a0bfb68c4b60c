use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tokio_util::codec::FramedWrite;
use tracing::{debug, warn};

use protocol::ChatCodec;

use crate::names::Roster;
use crate::server_types::{ClientId, Outbound, Registry};
use crate::transport::DatagramTransport;

/// Lines a stream participant may fall behind before further lines to it are dropped.
pub const OUTBOUND_QUEUE: usize = 64;

// a single write that takes longer than this drops the participant's outbound side
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

// handles msg delivery back to stream clients
#[derive(Clone)]
pub struct Delivery {
    registry: Registry,
}

impl Delivery {
    pub fn new(clients: &Registry) -> Self {
        Delivery {
            registry: Arc::clone(clients),
        }
    }

    pub async fn broadcast(&self, line: &str) -> usize {
        self.fan_out(None, line).await
    }

    pub async fn broadcast_except(&self, line: &str, except: ClientId) -> usize {
        self.fan_out(Some(except), line).await
    }

    // Only queues under the registry lock, the writes themselves happen in
    // each participant's writer task. A full or closed queue loses that one
    // line for that one participant.
    async fn fan_out(&self, except: Option<ClientId>, line: &str) -> usize {
        let r = self.registry.lock().await;
        let mut delivered = 0;

        for (k, entry) in r.iter() {
            if Some(*k) == except {
                continue;
            }

            match entry.link.try_send(line.to_owned()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(client_id = *k, name = %entry.name, "client not keeping up, line dropped")
                }
                Err(TrySendError::Closed(_)) => debug!(client_id = *k, name = %entry.name, "client writer gone"),
            }
        }

        delivered
    }
}

/// Moves a stream participant's framed writer into its own task and returns
/// the queue feeding it.
///
/// The task writes queued lines in order and half-closes the stream once
/// every sender is dropped. A failed or stalled write ends the task early.
pub fn spawn_writer<W>(client_id: ClientId, mut fw: FramedWrite<W, ChatCodec>) -> Outbound
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);

    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            match timeout(WRITE_TIMEOUT, fw.send(line)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(client_id, error = %e, "unable to write to client");
                    return;
                }
                Err(_) => {
                    warn!(client_id, "write stalled, dropping client outbound");
                    return;
                }
            }
        }

        match timeout(WRITE_TIMEOUT, close_link(&mut fw)).await {
            Ok(Ok(())) => debug!(client_id, "client outbound closed"),
            Ok(Err(e)) => debug!(client_id, error = %e, "close failed"),
            Err(_) => debug!(client_id, "close stalled"),
        }
    });

    tx
}

// Half-closes a stream participant's outbound side once pending units are flushed.
pub async fn close_link<W: AsyncWrite + Unpin>(link: &mut FramedWrite<W, ChatCodec>) -> io::Result<()> {
    link.get_mut().shutdown().await
}

/// Sends `line` to every registered address other than `origin`.
///
/// Datagrams are fire and forget: nothing is acknowledged or retried, so a
/// lost datagram is simply never seen by that recipient.
pub async fn send_except<T>(transport: &T, roster: &Roster<SocketAddr>, origin: SocketAddr, line: &str) -> usize
where
    T: DatagramTransport + ?Sized,
{
    let mut delivered = 0;

    for addr in roster.handles() {
        if *addr == origin {
            continue;
        }

        match transport.send_to(line.as_bytes(), *addr).await {
            Ok(_) => delivered += 1,
            Err(e) => warn!(peer = %addr, error = %e, "unable to send datagram"),
        }
    }

    delivered
}
