use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::str;
use std::sync::Arc;

use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::select;
use tracing::{debug, info, warn};

use protocol::MAX_UNIT_LEN;

use crate::registry_udp::UdpRegistry;
use crate::transport::DatagramTransport;

/// Connectionless chat server: one receive loop demultiplexes every datagram
/// by its source address.
pub struct UdpServer<T: ?Sized = UdpSocket> {
    transport: Arc<T>,
    registry: UdpRegistry<T>,
}

impl UdpServer<UdpSocket> {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(UdpServer::new(Arc::new(socket)))
    }
}

impl<T: DatagramTransport + ?Sized> UdpServer<T> {
    pub fn new(transport: Arc<T>) -> Self {
        let registry = UdpRegistry::new(Arc::clone(&transport));
        UdpServer { transport, registry }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Dispatches datagrams until `shutdown` resolves, then sends the
    /// shutdown notice to every participant.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let UdpServer { transport, mut registry } = self;
        let port = transport.local_addr()?.port();

        info!(
            "UDP CHATROOM running on port {} with {} clients connected.",
            port,
            registry.participant_count()
        );
        info!("Press CTRL+C to shutdown the server");

        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                received = recv_datagram(&*transport) => match received {
                    Ok((data, source)) => match str::from_utf8(&data) {
                        Ok(payload) => {
                            let outcome = registry.dispatch(source, payload).await;
                            debug!(%source, ?outcome, "datagram dispatched");
                        }
                        Err(_) => debug!(%source, "dropping datagram that is not utf-8"),
                    },
                    Err(e) => warn!(error = %e, "receive failed"),
                },
            }
        }

        let online = registry.participants();
        let notified = registry.shutdown().await;
        info!(notified, ?online, "server shutting down");

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> io::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

// Anything past one unit is cut off by the read buffer, as on the sending side.
async fn recv_datagram<T: DatagramTransport + ?Sized>(transport: &T) -> io::Result<(Vec<u8>, SocketAddr)> {
    let mut buf = vec![0u8; MAX_UNIT_LEN];
    let (n, source) = transport.recv_from(&mut buf).await?;
    buf.truncate(n);
    Ok((buf, source))
}
