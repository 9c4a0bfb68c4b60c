use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use protocol::{JoinReply, SHUTDOWN};

use crate::display::Console;
use crate::input_reader::{Input, InputReader};
use crate::link::{LinkReader, LinkWriter};
use crate::types::{ClientError, SessionEnd};

const SHUTDOWN_NOTICE: &str = "Server is shutting down...";
const TOO_LONG_NOTICE: &str = "Message too long, not sent.";

/// A joined chat participant, ready to run an interactive session.
pub struct Client<R, W> {
    name: String,
    reader: R,
    writer: W,
}

impl<R, W> Client<R, W>
where
    R: LinkReader + 'static,
    W: LinkWriter,
{
    /// Sends the join request and waits for the server's verdict.
    pub async fn join(name: &str, mut reader: R, mut writer: W) -> Result<Self, ClientError> {
        writer.join(name).await?;

        let reply = reader.recv().await?.ok_or(ClientError::Closed)?;
        match JoinReply::parse(&reply) {
            JoinReply::Welcome => {
                info!("{} joined the chatroom", name);
                Ok(Client {
                    name: name.to_owned(),
                    reader,
                    writer,
                })
            }
            JoinReply::Rejected(text) => Err(ClientError::Rejected(text)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drives the session until the user leaves, `interrupt` fires, the
    /// server shuts down or the link drops.
    ///
    /// Incoming lines are printed by a spawned receive task while this task
    /// reads `input`; either side ending cancels the other.
    pub async fn run<I, O, F>(self, input: I, output: O, interrupt: F) -> Result<SessionEnd, ClientError>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let Client { name, reader, mut writer } = self;
        let console = Console::new(output, &name);
        let done = CancellationToken::new();

        let receiver = tokio::spawn(receive_loop(reader, console.clone(), done.clone()));

        let typed = input_loop(&name, &mut writer, InputReader::new(input), &console, &done, interrupt).await;
        done.cancel();

        let received = match receiver.await {
            Ok(end) => end,
            Err(e) => {
                warn!("receive task failed {:?}", e);
                None
            }
        };

        debug!(?typed, ?received, "session finished");

        match (typed, received) {
            (Ok(Some(end)), _) => Ok(end),
            (Ok(None), end) => Ok(end.unwrap_or(SessionEnd::ConnectionLost)),
            // a failed write after the server went away is not an error of its own
            (Err(_), Some(end)) => Ok(end),
            (Err(e), None) => Err(e),
        }
    }
}

// Returns None when the session was ended from the input side
async fn receive_loop<R, O>(mut reader: R, console: Console<O>, done: CancellationToken) -> Option<SessionEnd>
where
    R: LinkReader,
    O: AsyncWrite + Unpin + Send,
{
    loop {
        let unit = select! {
            biased;
            _ = done.cancelled() => return None,
            unit = reader.recv() => unit,
        };

        let end = match unit {
            Ok(Some(line)) if line == SHUTDOWN => {
                if let Err(e) = console.notice(SHUTDOWN_NOTICE).await {
                    debug!("unable to print shutdown notice {:?}", e);
                }
                SessionEnd::ServerShutdown
            }
            Ok(Some(line)) => {
                if let Err(e) = console.message(&line).await {
                    debug!("unable to print message {:?}", e);
                }
                continue;
            }
            Ok(None) => {
                info!("server closed the connection");
                SessionEnd::ConnectionLost
            }
            Err(e) => {
                info!("lost connection to server {}", e);
                SessionEnd::ConnectionLost
            }
        };

        done.cancel();
        return Some(end);
    }
}

// Returns None when the receive side ended the session first
async fn input_loop<W, I, O, F>(
    name: &str,
    writer: &mut W,
    mut input: InputReader<I>,
    console: &Console<O>,
    done: &CancellationToken,
    interrupt: F,
) -> Result<Option<SessionEnd>, ClientError>
where
    W: LinkWriter,
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin + Send,
    F: Future<Output = ()>,
{
    tokio::pin!(interrupt);

    loop {
        console.prompt().await?;

        let next = select! {
            biased;
            _ = done.cancelled() => return Ok(None),
            _ = &mut interrupt => {
                info!("interrupted, leaving the chatroom");
                writer.exit(name).await?;
                return Ok(Some(SessionEnd::Interrupted));
            }
            next = input.read() => next?,
        };

        match next {
            Some(Input::Exit) | None => {
                writer.exit(name).await?;
                return Ok(Some(SessionEnd::Exited));
            }
            Some(Input::Line(text)) if writer.chat_fits(name, &text) => writer.chat(name, &text).await?,
            Some(Input::Line(_)) | Some(Input::Oversized) => console.notice(TOO_LONG_NOTICE).await?,
        }
    }
}
