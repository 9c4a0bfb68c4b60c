use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::select;
use tokio_util::codec::FramedRead;
use tracing::{debug, info};

use protocol::ChatCodec;

use crate::error::RelayError;
use crate::registry_tcp::TcpRegistry;
use crate::server_types::RelayEnd;

// Handles server communication from one stream client: the join handshake
// followed by its relay loop. Essentially a client actor on the server side.
pub struct ClientHandler {
    registry: TcpRegistry,
    peer: SocketAddr,
}

impl ClientHandler {
    pub fn new(registry: TcpRegistry, peer: SocketAddr) -> Self {
        ClientHandler { registry, peer }
    }

    pub async fn run_stream(self, stream: TcpStream) -> Result<RelayEnd, RelayError> {
        let (tcp_read, tcp_write) = stream.into_split();
        self.run(tcp_read, tcp_write).await
    }

    pub async fn run<R, W>(self, reader: R, writer: W) -> Result<RelayEnd, RelayError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut fr = FramedRead::new(reader, ChatCodec);
        let shutdown = self.registry.shutdown_token();

        // a connection that never names itself must not hold up shutdown
        let admitted = select! {
            _ = shutdown.cancelled() => return Ok(RelayEnd::Shutdown),
            admitted = self.registry.admit(&mut fr, writer) => admitted,
        };

        let client_id = match admitted {
            Ok(client_id) => client_id,
            Err(e) => {
                info!(peer = %self.peer, error = %e, "join not accepted");
                return Err(e);
            }
        };

        let end = self.registry.relay(client_id, &mut fr).await;
        debug!(peer = %self.peer, client_id, ?end, "relay finished");

        Ok(end)
    }
}
