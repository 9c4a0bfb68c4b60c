use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::select;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::client_handler::ClientHandler;
use crate::error::RelayError;
use crate::registry_tcp::TcpRegistry;
use crate::server_types::RelayEnd;

/// Connection oriented chat server: accepts connections and hands each to
/// its own handler task.
pub struct TcpServer {
    listener: TcpListener,
    registry: TcpRegistry,
}

impl TcpServer {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(TcpServer {
            listener,
            registry: TcpRegistry::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> TcpRegistry {
        self.registry.clone()
    }

    /// Accepts participants until `shutdown` resolves, then notifies and
    /// disconnects everyone and waits for every handler to finish.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let TcpServer { listener, registry } = self;
        let port = listener.local_addr()?.port();

        info!(
            "TCP CHATROOM running on port {} with {} clients connected.",
            port,
            registry.participant_count().await
        );
        info!("Press CTRL+C to shutdown the server");

        let mut handlers: JoinSet<Result<RelayEnd, RelayError>> = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((tcp_socket, addr)) => {
                        info!("Server received new client connection {:?}", &addr);
                        let handler = ClientHandler::new(registry.clone(), addr);
                        handlers.spawn(handler.run_stream(tcp_socket));
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
                Some(finished) = handlers.join_next() => {
                    if let Err(e) = finished {
                        warn!(error = %e, "client handler aborted");
                    }
                }
            }
        }

        // stop accepting before the roster is torn down
        drop(listener);

        let online = registry.participants().await;
        let notified = registry.shutdown().await;
        info!(notified, ?online, "server shutting down");

        while handlers.join_next().await.is_some() {}

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
