use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::info;

use protocol::{datagram_exit, datagram_line, join_request, MAX_UNIT_LEN};

use crate::link::{LinkReader, LinkWriter};
use crate::types::ClientError;

// Both halves share one socket connected to the server, so datagrams from
// any other source are filtered out by the OS.
pub struct UdpLinkReader {
    socket: Arc<UdpSocket>,
}

pub struct UdpLinkWriter {
    socket: Arc<UdpSocket>,
}

pub async fn connect(addr: SocketAddr) -> Result<(UdpLinkReader, UdpLinkWriter), ClientError> {
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local)
        .await
        .map_err(|source| ClientError::Connect { addr, source })?;
    socket
        .connect(addr)
        .await
        .map_err(|source| ClientError::Connect { addr, source })?;

    info!("Client bound {:?} for server {:?}", socket.local_addr()?, &addr);

    let socket = Arc::new(socket);
    Ok((
        UdpLinkReader { socket: Arc::clone(&socket) },
        UdpLinkWriter { socket },
    ))
}

impl UdpLinkWriter {
    async fn send(&self, line: &str) -> Result<(), ClientError> {
        protocol::check_unit(line)?;
        self.socket.send(line.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl LinkWriter for UdpLinkWriter {
    async fn join(&mut self, name: &str) -> Result<(), ClientError> {
        self.send(&join_request(name)).await
    }

    async fn chat(&mut self, name: &str, text: &str) -> Result<(), ClientError> {
        self.send(&datagram_line(name, text)).await
    }

    async fn exit(&mut self, name: &str) -> Result<(), ClientError> {
        self.send(&datagram_exit(name)).await
    }
}

#[async_trait]
impl LinkReader for UdpLinkReader {
    // a datagram link is never closed by the peer
    async fn recv(&mut self) -> Result<Option<String>, ClientError> {
        let mut buf = [0u8; MAX_UNIT_LEN];
        let n = self.socket.recv(&mut buf).await?;
        Ok(Some(String::from_utf8_lossy(&buf[..n]).into_owned()))
    }
}
