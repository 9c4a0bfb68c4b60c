use std::net::SocketAddr;

use async_trait::async_trait;
use futures::SinkExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::info;

use protocol::{ChatCodec, EXIT};

use crate::link::{LinkReader, LinkWriter};
use crate::types::ClientError;

pub struct TcpLinkReader {
    fr: FramedRead<OwnedReadHalf, ChatCodec>,
}

pub struct TcpLinkWriter {
    fw: FramedWrite<OwnedWriteHalf, ChatCodec>,
}

pub async fn connect(addr: SocketAddr) -> Result<(TcpLinkReader, TcpLinkWriter), ClientError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect { addr, source })?;

    info!("Client connected to server {:?}", &addr);

    // split tcpstream so we can hand off to r & w tasks
    let (client_read, client_write) = stream.into_split();

    Ok((
        TcpLinkReader { fr: FramedRead::new(client_read, ChatCodec) },
        TcpLinkWriter { fw: FramedWrite::new(client_write, ChatCodec) },
    ))
}

#[async_trait]
impl LinkWriter for TcpLinkWriter {
    async fn join(&mut self, name: &str) -> Result<(), ClientError> {
        self.fw.send(name).await?;
        Ok(())
    }

    // the server prefixes the sender's name itself
    async fn chat(&mut self, _name: &str, text: &str) -> Result<(), ClientError> {
        self.fw.send(text).await?;
        Ok(())
    }

    async fn exit(&mut self, _name: &str) -> Result<(), ClientError> {
        self.fw.send(EXIT).await?;
        Ok(())
    }
}

#[async_trait]
impl LinkReader for TcpLinkReader {
    async fn recv(&mut self) -> Result<Option<String>, ClientError> {
        match self.fr.next().await {
            Some(unit) => Ok(Some(unit?)),
            None => Ok(None),
        }
    }
}
