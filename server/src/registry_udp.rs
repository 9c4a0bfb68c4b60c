//! Connectionless registry: participants are bound by source address.
//!
//! The registry is owned by the single receive loop that drives
//! [`UdpRegistry::dispatch`], so it needs no lock of its own.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use protocol::{datagram_exit, Event, Inbound, NAME_TAKEN, SHUTDOWN, WELCOME};

use crate::delivery::send_except;
use crate::error::RelayError;
use crate::names::Roster;
use crate::server_types::Dispatch;
use crate::transport::DatagramTransport;

pub const HISTORY_CAPACITY: usize = 64;

/// Accepted events in arrival order, bounded to the most recent
/// [`HISTORY_CAPACITY`] entries.
#[derive(Debug, Default)]
pub struct History {
    entries: VecDeque<(SocketAddr, String)>,
}

impl History {
    pub fn push(&mut self, origin: SocketAddr, line: String) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((origin, line));
    }

    pub fn latest(&self) -> Option<&(SocketAddr, String)> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct UdpRegistry<T: ?Sized> {
    transport: Arc<T>,
    clients: Roster<SocketAddr>,
    history: History,
}

impl<T: DatagramTransport + ?Sized> UdpRegistry<T> {
    pub fn new(transport: Arc<T>) -> Self {
        UdpRegistry {
            transport,
            clients: Roster::new(),
            history: History::default(),
        }
    }

    pub fn participant_count(&self) -> usize {
        self.clients.len()
    }

    pub fn participants(&self) -> Vec<String> {
        self.clients.names()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub async fn admit(&mut self, source: SocketAddr, name: &str) -> Result<(), RelayError> {
        if self.clients.contains_name(name) {
            info!(%source, name, "join rejected, name already taken");
            self.reply(source, NAME_TAKEN).await?;
            return Err(RelayError::NameConflict(name.to_owned()));
        }

        self.reply(source, WELCOME).await?;
        self.clients.insert(source, name.to_owned(), ())?;
        info!("{} joined the chatroom", name);

        self.record(source, Event::Joined(name.to_owned()).to_string()).await;
        Ok(())
    }

    /// Per datagram decision of the receive loop.
    pub async fn dispatch(&mut self, source: SocketAddr, payload: &str) -> Dispatch {
        match Inbound::parse(payload) {
            Inbound::Join(name) => match self.admit(source, name).await {
                Ok(()) => Dispatch::Joined,
                Err(RelayError::NameConflict(_)) => Dispatch::Rejected,
                Err(e) => {
                    warn!(%source, error = %e, "join reply failed");
                    Dispatch::Dropped
                }
            },
            Inbound::Line(line) => {
                let is_exit = match self.clients.name_of(&source) {
                    Some(name) => line == datagram_exit(name),
                    None => {
                        debug!(%source, "dropping datagram from unknown address");
                        return Dispatch::Dropped;
                    }
                };

                if is_exit {
                    self.remove(source).await;
                    Dispatch::Left
                } else {
                    self.record(source, line.to_owned()).await;
                    Dispatch::Relayed
                }
            }
        }
    }

    /// Sends the latest history entry to every address but its origin.
    pub async fn broadcast(&self) -> usize {
        match self.history.latest() {
            Some((origin, line)) => send_except(&*self.transport, &self.clients, *origin, line).await,
            None => 0,
        }
    }

    pub async fn remove(&mut self, source: SocketAddr) -> bool {
        match self.clients.remove(&source) {
            Some(entry) => {
                info!("{} left the chatroom", entry.name);
                self.record(source, Event::Left(entry.name).to_string()).await;
                true
            }
            None => false,
        }
    }

    /// Sends the shutdown notice to every participant and forgets them all.
    pub async fn shutdown(&mut self) -> usize {
        let mut notified = 0;

        for (addr, entry) in self.clients.drain().collect::<Vec<_>>() {
            match self.transport.send_to(SHUTDOWN.as_bytes(), addr).await {
                Ok(_) => notified += 1,
                Err(e) => warn!(peer = %addr, name = %entry.name, error = %e, "unable to send shutdown notice"),
            }
        }

        notified
    }

    async fn record(&mut self, origin: SocketAddr, line: String) {
        self.history.push(origin, line);
        let delivered = self.broadcast().await;
        debug!(%origin, delivered, "broadcast latest event");
    }

    async fn reply(&self, target: SocketAddr, line: &str) -> Result<(), RelayError> {
        self.transport.send_to(line.as_bytes(), target).await?;
        Ok(())
    }
}
