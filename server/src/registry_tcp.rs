//! Connection oriented registry: one framed stream per participant.
//!
//! All mutation of the participant map and every fan out iterates under the
//! same registry mutex, so a join or leave can never interleave with a
//! broadcast that is halfway through the peers. Writes to the sockets happen
//! outside the lock, in one writer task per participant.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use protocol::{check_unit, ChatCodec, Event, EXIT, NAME_TAKEN, SHUTDOWN, WELCOME};

use crate::delivery::{close_link, spawn_writer, Delivery};
use crate::error::RelayError;
use crate::names::Roster;
use crate::server_types::{ClientId, Registry, RelayEnd};

const COUNTER_SEED: ClientId = 1;

#[derive(Clone)]
pub struct TcpRegistry {
    clients: Registry,
    outgoing: Delivery,
    counter: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl Default for TcpRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpRegistry {
    pub fn new() -> Self {
        let clients: Registry = Arc::new(Mutex::new(Roster::new()));
        let outgoing = Delivery::new(&clients);

        TcpRegistry {
            clients,
            outgoing,
            counter: Arc::new(AtomicU64::new(COUNTER_SEED)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token cancelled once [`TcpRegistry::shutdown`] has run.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn participant_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn participants(&self) -> Vec<String> {
        self.clients.lock().await.names()
    }

    /// Reads the join request off a fresh connection and registers it.
    ///
    /// The reply (`Welcome` or `Name already taken`) is queued before the
    /// participant becomes visible to broadcasts, so an admitted client always
    /// sees the acceptance as its first unit. On success every other
    /// participant receives the join notice.
    pub async fn admit<R, W>(&self, reader: &mut FramedRead<R, ChatCodec>, writer: W) -> Result<ClientId, RelayError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let name = match reader.next().await {
            Some(unit) => unit?,
            None => return Err(RelayError::NoJoinRequest),
        };

        let mut fw = FramedWrite::new(writer, ChatCodec);
        let client_id = self.counter.fetch_add(1, Ordering::Relaxed);

        {
            let mut clients = self.clients.lock().await;

            if self.shutdown.is_cancelled() {
                drop(clients);
                fw.send(SHUTDOWN).await?;
                close_link(&mut fw).await?;
                return Err(RelayError::ShuttingDown);
            }

            if clients.contains_name(&name) {
                drop(clients);
                info!(%name, "join rejected, name already taken");
                fw.send(NAME_TAKEN).await?;
                close_link(&mut fw).await?;
                return Err(RelayError::NameConflict(name));
            }

            let link = spawn_writer(client_id, fw);
            // fresh queue, only fails if the writer already died
            if let Err(e) = link.try_send(WELCOME.to_owned()) {
                debug!(client_id, error = %e, "unable to queue welcome");
            }
            clients.insert(client_id, name.clone(), link)?;
        }

        info!("{} joined the chatroom", name);
        self.broadcast(client_id, &Event::Joined(name).to_string()).await;

        Ok(client_id)
    }

    /// Relays every unit read from an admitted participant until it leaves,
    /// its transport fails, or the server shuts down.
    pub async fn relay<R>(&self, client_id: ClientId, reader: &mut FramedRead<R, ChatCodec>) -> RelayEnd
    where
        R: AsyncRead + Unpin,
    {
        let name = match self.clients.lock().await.name_of(&client_id) {
            Some(name) => name.to_owned(),
            None => return RelayEnd::Shutdown,
        };

        loop {
            let unit = select! {
                biased;
                _ = self.shutdown.cancelled() => return RelayEnd::Shutdown,
                unit = reader.next() => unit,
            };

            match unit {
                Some(Ok(line)) if line == EXIT => {
                    self.depart(client_id).await;
                    return RelayEnd::Exited;
                }
                Some(Ok(line)) if line.is_empty() => continue,
                Some(Ok(text)) => {
                    let line = Event::Chat { name: name.clone(), text }.to_string();
                    // clients cap their input so the prefixed line fits, a
                    // line that still does not is dropped here
                    if let Err(e) = check_unit(&line) {
                        warn!(%name, error = %e, "dropping chat line");
                        continue;
                    }
                    debug!(client_id, %line, "relaying");
                    self.broadcast(client_id, &line).await;
                }
                Some(Err(e)) => {
                    debug!(client_id, %name, error = %e, "read failed");
                    return self.transport_failure(client_id).await;
                }
                None => {
                    debug!(client_id, %name, "connection closed by peer");
                    return self.transport_failure(client_id).await;
                }
            }
        }
    }

    /// Sends `line` to every participant except `excluded`.
    pub async fn broadcast(&self, excluded: ClientId, line: &str) -> usize {
        self.outgoing.broadcast_except(line, excluded).await
    }

    /// Sends the shutdown notice to, and closes, every connection.
    ///
    /// Returns the number of participants the notice was queued for. Only
    /// the first call does any work. Each connection closes once its writer
    /// has flushed what was queued before the notice.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<_> = {
            let mut clients = self.clients.lock().await;
            if self.shutdown.is_cancelled() {
                return 0;
            }
            self.shutdown.cancel();
            clients.drain().collect()
        };

        let mut notified = 0;
        for (client_id, entry) in drained {
            match entry.link.try_send(SHUTDOWN.to_owned()) {
                Ok(()) => notified += 1,
                Err(e) => warn!(client_id, name = %entry.name, error = %e, "unable to queue shutdown notice"),
            }
        }

        notified
    }

    // explicit exit: others are told, then the connection is closed
    async fn depart(&self, client_id: ClientId) {
        let removed = self.clients.lock().await.remove(&client_id);

        if let Some(entry) = removed {
            info!("{} left the chatroom", entry.name);
            self.outgoing.broadcast(&Event::Left(entry.name).to_string()).await;
            // dropping the entry's queue lets the writer close the stream
        }
    }

    // Best effort path: the participant is dropped without a leave notice.
    async fn transport_failure(&self, client_id: ClientId) -> RelayEnd {
        if let Some(entry) = self.clients.lock().await.remove(&client_id) {
            info!(name = %entry.name, "participant lost");
        }
        RelayEnd::TransportFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::OUTBOUND_QUEUE;
    use std::time::Duration;
    use tokio::io::{split, DuplexStream, ReadHalf, WriteHalf};
    use tokio::time::timeout;

    type ServerWrite = WriteHalf<DuplexStream>;
    type ServerRead = FramedRead<ReadHalf<DuplexStream>, ChatCodec>;

    struct Peer {
        fr: FramedRead<ReadHalf<DuplexStream>, ChatCodec>,
        fw: FramedWrite<WriteHalf<DuplexStream>, ChatCodec>,
    }

    impl Peer {
        async fn say(&mut self, line: &str) {
            self.fw.send(line).await.unwrap();
        }

        async fn hear(&mut self) -> Option<String> {
            timeout(Duration::from_secs(1), self.fr.next())
                .await
                .expect("timed out waiting for unit")
                .map(|unit| unit.unwrap())
        }
    }

    fn pipe(capacity: usize) -> (Peer, ServerRead, ServerWrite) {
        let (client, server) = tokio::io::duplex(capacity);
        let (cr, cw) = split(client);
        let (sr, sw) = split(server);
        let peer = Peer {
            fr: FramedRead::new(cr, ChatCodec),
            fw: FramedWrite::new(cw, ChatCodec),
        };
        (peer, FramedRead::new(sr, ChatCodec), sw)
    }

    async fn join(registry: &TcpRegistry, name: &str) -> (Peer, ServerRead, Result<ClientId, RelayError>) {
        join_over(registry, name, 4096).await
    }

    async fn join_over(
        registry: &TcpRegistry,
        name: &str,
        capacity: usize,
    ) -> (Peer, ServerRead, Result<ClientId, RelayError>) {
        let (mut peer, mut sr, sw) = pipe(capacity);
        peer.say(name).await;
        let admitted = registry.admit(&mut sr, sw).await;
        (peer, sr, admitted)
    }

    #[tokio::test]
    async fn admit_welcomes_and_announces() {
        let registry = TcpRegistry::new();

        let (mut alice, _ar, a) = join(&registry, "alice").await;
        assert!(a.is_ok());
        assert_eq!(alice.hear().await.as_deref(), Some(WELCOME));

        let (mut bob, _br, b) = join(&registry, "bob").await;
        assert!(b.is_ok());
        assert_eq!(bob.hear().await.as_deref(), Some(WELCOME));
        assert_eq!(alice.hear().await.as_deref(), Some("User bob joined"));
        assert_eq!(registry.participant_count().await, 2);
    }

    #[tokio::test]
    async fn duplicate_name_is_refused() {
        let registry = TcpRegistry::new();
        let (_alice, _ar, _) = join(&registry, "alice").await;

        let (mut imposter, _ir, result) = join(&registry, "alice").await;
        assert!(matches!(result, Err(RelayError::NameConflict(_))));
        assert_eq!(imposter.hear().await.as_deref(), Some(NAME_TAKEN));
        // rejected connection is closed straight after the reply
        assert_eq!(imposter.hear().await, None);
        assert_eq!(registry.participant_count().await, 1);
    }

    #[tokio::test]
    async fn closed_before_name_is_not_a_join() {
        let registry = TcpRegistry::new();
        let (peer, mut sr, sw) = pipe(4096);
        drop(peer);

        let result = registry.admit(&mut sr, sw).await;
        assert!(matches!(result, Err(RelayError::NoJoinRequest)));
        assert_eq!(registry.participant_count().await, 0);
    }

    #[tokio::test]
    async fn chat_reaches_others_but_not_sender() {
        let registry = TcpRegistry::new();
        let (mut alice, mut ar, a) = join(&registry, "alice").await;
        let (mut bob, _br, _) = join(&registry, "bob").await;
        let (mut carol, _cr, _) = join(&registry, "carol").await;
        let alice_id = a.unwrap();

        alice.hear().await; // Welcome
        alice.hear().await; // bob joined
        alice.hear().await; // carol joined
        bob.hear().await; // Welcome
        bob.hear().await; // carol joined
        carol.hear().await; // Welcome

        let relay = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.relay(alice_id, &mut ar).await })
        };

        alice.say("hi").await;
        assert_eq!(bob.hear().await.as_deref(), Some("alice: hi"));
        assert_eq!(carol.hear().await.as_deref(), Some("alice: hi"));

        alice.say(EXIT).await;
        assert_eq!(relay.await.unwrap(), RelayEnd::Exited);
        assert_eq!(bob.hear().await.as_deref(), Some("User alice left"));
        assert_eq!(carol.hear().await.as_deref(), Some("User alice left"));

        // alice never heard her own line and her connection is now closed
        assert_eq!(alice.hear().await, None);
        assert_eq!(registry.participant_count().await, 2);
    }

    #[tokio::test]
    async fn name_is_reusable_after_exit() {
        let registry = TcpRegistry::new();
        let (mut alice, mut ar, a) = join(&registry, "alice").await;
        alice.say(EXIT).await;
        assert_eq!(registry.relay(a.unwrap(), &mut ar).await, RelayEnd::Exited);

        let (_again, _r, again) = join(&registry, "alice").await;
        assert!(again.is_ok());
        assert_eq!(registry.participant_count().await, 1);
    }

    #[tokio::test]
    async fn disconnect_removes_without_leave_notice() {
        let registry = TcpRegistry::new();
        let (alice, mut ar, a) = join(&registry, "alice").await;
        let (mut bob, _br, _) = join(&registry, "bob").await;
        bob.hear().await; // Welcome

        drop(alice);
        assert_eq!(registry.relay(a.unwrap(), &mut ar).await, RelayEnd::TransportFailure);
        assert_eq!(registry.participant_count().await, 1);

        registry.shutdown().await;
        // the next thing bob sees is the shutdown, no leave notice for alice
        assert_eq!(bob.hear().await.as_deref(), Some(SHUTDOWN));
    }

    #[tokio::test]
    async fn shutdown_notifies_each_participant_once() {
        let registry = TcpRegistry::new();
        let (mut alice, mut ar, a) = join(&registry, "alice").await;
        let (mut bob, _br, _) = join(&registry, "bob").await;
        alice.hear().await; // Welcome
        alice.hear().await; // bob joined
        bob.hear().await; // Welcome

        let relay = {
            let registry = registry.clone();
            let id = a.unwrap();
            tokio::spawn(async move { registry.relay(id, &mut ar).await })
        };

        assert_eq!(registry.shutdown().await, 2);
        assert_eq!(registry.shutdown().await, 0);
        assert_eq!(registry.participant_count().await, 0);
        assert_eq!(relay.await.unwrap(), RelayEnd::Shutdown);

        for peer in [&mut alice, &mut bob] {
            assert_eq!(peer.hear().await.as_deref(), Some(SHUTDOWN));
            assert_eq!(peer.hear().await, None);
        }
    }

    #[tokio::test]
    async fn join_after_shutdown_is_turned_away() {
        let registry = TcpRegistry::new();
        registry.shutdown().await;

        let (mut late, _lr, result) = join(&registry, "late").await;
        assert!(matches!(result, Err(RelayError::ShuttingDown)));
        assert_eq!(late.hear().await.as_deref(), Some(SHUTDOWN));
        assert_eq!(registry.participant_count().await, 0);
    }

    #[tokio::test]
    async fn stalled_reader_does_not_hold_up_others() {
        let registry = TcpRegistry::new();
        let (mut alice, mut ar, a) = join(&registry, "alice").await;
        // bob never reads, his small pipe fills after a few lines
        let (_bob, _br, _) = join_over(&registry, "bob", 64).await;
        let (mut carol, _cr, _) = join(&registry, "carol").await;

        alice.hear().await; // Welcome
        alice.hear().await; // bob joined
        alice.hear().await; // carol joined
        carol.hear().await; // Welcome

        let relay = {
            let registry = registry.clone();
            let id = a.unwrap();
            tokio::spawn(async move { registry.relay(id, &mut ar).await })
        };

        for i in 0..OUTBOUND_QUEUE * 2 {
            alice.say(&i.to_string()).await;
            assert_eq!(carol.hear().await, Some(format!("alice: {}", i)));
        }

        let notified = timeout(Duration::from_secs(2), registry.shutdown())
            .await
            .expect("shutdown blocked behind a stalled participant");
        // bob's queue is full, everyone else is told
        assert_eq!(notified, 2);
        assert_eq!(relay.await.unwrap(), RelayEnd::Shutdown);

        for peer in [&mut alice, &mut carol] {
            assert_eq!(peer.hear().await.as_deref(), Some(SHUTDOWN));
            assert_eq!(peer.hear().await, None);
        }
    }

    #[tokio::test]
    async fn vanished_reader_does_not_hold_up_others() {
        let registry = TcpRegistry::new();
        let (mut alice, mut ar, a) = join(&registry, "alice").await;
        let (bob, _br, _) = join(&registry, "bob").await;
        let (mut carol, _cr, _) = join(&registry, "carol").await;
        alice.hear().await; // Welcome
        alice.hear().await; // bob joined
        alice.hear().await; // carol joined
        carol.hear().await; // Welcome

        // bob's side of the pipe is gone, writes to him now fail
        drop(bob);

        let relay = {
            let registry = registry.clone();
            let id = a.unwrap();
            tokio::spawn(async move { registry.relay(id, &mut ar).await })
        };

        for text in ["one", "two", "three"] {
            alice.say(text).await;
            assert_eq!(carol.hear().await, Some(format!("alice: {}", text)));
        }

        timeout(Duration::from_secs(2), registry.shutdown()).await.unwrap();
        assert_eq!(carol.hear().await.as_deref(), Some(SHUTDOWN));
        assert_eq!(relay.await.unwrap(), RelayEnd::Shutdown);
    }
}
