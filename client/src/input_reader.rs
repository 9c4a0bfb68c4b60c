//! Reads user lines from the terminal (or any byte source) and classifies
//! them for the session loop.

use tokio::io::AsyncRead;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use protocol::{EXIT, MAX_UNIT_LEN};

use crate::types::ClientError;

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Line(String),
    Exit,
    /// Line longer than a wire unit, already discarded by the codec
    Oversized,
}

impl Input {
    // the codec has already stripped the line terminator
    pub fn parse(line: &str) -> Input {
        if line == EXIT {
            Input::Exit
        } else {
            Input::Line(line.to_owned())
        }
    }
}

pub struct InputReader<I> {
    fr: FramedRead<I, LinesCodec>,
}

impl<I: AsyncRead + Unpin> InputReader<I> {
    pub fn new(input: I) -> Self {
        InputReader {
            fr: FramedRead::new(input, LinesCodec::new_with_max_length(MAX_UNIT_LEN)),
        }
    }

    /// Next user input, `None` once the source is exhausted.
    /// Cancel safe, a partially typed line stays buffered.
    pub async fn read(&mut self) -> Result<Option<Input>, ClientError> {
        match self.fr.next().await {
            Some(Ok(line)) => Ok(Some(Input::parse(&line))),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => Ok(Some(Input::Oversized)),
            Some(Err(LinesCodecError::Io(e))) => Err(e.into()),
            None => Ok(None),
        }
    }
}
