use std::net::SocketAddr;
use std::time::Duration;

use futures::SinkExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};

use protocol::ChatCodec;
use server::{TcpRegistry, TcpServer};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

struct Participant {
    fr: FramedRead<OwnedReadHalf, ChatCodec>,
    fw: FramedWrite<OwnedWriteHalf, ChatCodec>,
}

impl Participant {
    async fn connect(addr: SocketAddr, name: &str) -> (Participant, String) {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read, write) = stream.into_split();
        let mut p = Participant {
            fr: FramedRead::new(read, ChatCodec),
            fw: FramedWrite::new(write, ChatCodec),
        };
        p.say(name).await;
        let reply = p.hear().await.expect("join reply");
        (p, reply)
    }

    async fn say(&mut self, line: &str) {
        self.fw.send(line).await.expect("send unit");
    }

    async fn hear(&mut self) -> Option<String> {
        timeout(READ_TIMEOUT, self.fr.next())
            .await
            .expect("timed out waiting for unit")
            .map(|unit| unit.expect("valid unit"))
    }
}

struct Running {
    addr: SocketAddr,
    registry: TcpRegistry,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

async fn start() -> Running {
    let server = TcpServer::bind("127.0.0.1:0").await.expect("bind");
    let addr = server.local_addr().expect("local addr");
    let registry = server.registry();
    let (stop, stopped) = oneshot::channel::<()>();

    let handle = tokio::spawn(server.run_until(async move {
        let _ = stopped.await;
    }));

    Running { addr, registry, stop, handle }
}

async fn wait_for_count(registry: &TcpRegistry, expected: usize) {
    for _ in 0..100 {
        if registry.participant_count().await == expected {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("registry never reached {} participants", expected);
}

#[tokio::test]
async fn chatroom_scenario_over_tcp() {
    let running = start().await;
    let addr = running.addr;

    let (mut alice, reply) = Participant::connect(addr, "alice").await;
    assert_eq!(reply, "Welcome");

    let (mut imposter, reply) = Participant::connect(addr, "alice").await;
    assert_eq!(reply, "Name already taken");
    assert_eq!(imposter.hear().await, None);
    assert_eq!(running.registry.participant_count().await, 1);

    let (mut bob, reply) = Participant::connect(addr, "bob").await;
    assert_eq!(reply, "Welcome");
    assert_eq!(alice.hear().await.as_deref(), Some("User bob joined"));
    assert_eq!(running.registry.participants().await, vec!["alice", "bob"]);

    alice.say("hi").await;
    assert_eq!(bob.hear().await.as_deref(), Some("alice: hi"));

    alice.say("exit").await;
    assert_eq!(bob.hear().await.as_deref(), Some("User alice left"));
    assert_eq!(alice.hear().await, None);
    wait_for_count(&running.registry, 1).await;

    running.stop.send(()).expect("server still running");
    assert_eq!(bob.hear().await.as_deref(), Some("server-shutdown"));
    assert_eq!(bob.hear().await, None);

    running.handle.await.expect("join").expect("server result");
    assert_eq!(running.registry.participant_count().await, 0);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn abrupt_disconnect_is_not_announced() {
    let running = start().await;

    let (alice, _) = Participant::connect(running.addr, "alice").await;
    let (mut bob, _) = Participant::connect(running.addr, "bob").await;
    drop(alice);
    wait_for_count(&running.registry, 1).await;

    // the name is free again and bob only hears about the newcomer
    let (_again, reply) = Participant::connect(running.addr, "alice").await;
    assert_eq!(reply, "Welcome");
    assert_eq!(bob.hear().await.as_deref(), Some("User alice joined"));

    running.stop.send(()).expect("server still running");
    running.handle.await.expect("join").expect("server result");
}

#[tokio::test]
async fn every_participant_hears_shutdown_once() {
    let running = start().await;

    let mut peers = Vec::new();
    for name in ["p1", "p2", "p3", "p4"] {
        let (p, reply) = Participant::connect(running.addr, name).await;
        assert_eq!(reply, "Welcome");
        peers.push(p);
    }
    assert_eq!(running.registry.participant_count().await, 4);

    running.stop.send(()).expect("server still running");
    running.handle.await.expect("join").expect("server result");

    for (i, peer) in peers.iter_mut().enumerate() {
        // earlier joiners first drain the join notices of later ones
        for _ in i + 1..4 {
            let notice = peer.hear().await.expect("join notice");
            assert!(notice.ends_with(" joined"), "unexpected {}", notice);
        }
        assert_eq!(peer.hear().await.as_deref(), Some("server-shutdown"));
        assert_eq!(peer.hear().await, None);
    }
}
