use std::io;
use std::str;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::MAX_UNIT_LEN;

const DELIMITER: u8 = b'\n';

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unit exceeds 1024 bytes (got {len})")]
    UnitTooLong { len: usize },
    #[error("unit contains a line break")]
    EmbeddedNewline,
    #[error("unit is not valid utf-8")]
    InvalidUtf8,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Checks that `unit` can travel as a single wire unit.
pub fn check_unit(unit: &str) -> Result<(), ProtocolError> {
    if unit.len() > MAX_UNIT_LEN {
        return Err(ProtocolError::UnitTooLong { len: unit.len() });
    }
    if unit.contains(DELIMITER as char) {
        return Err(ProtocolError::EmbeddedNewline);
    }
    Ok(())
}

// Frames text units on a byte stream, one unit per `\n` terminated line.
// A trailing `\r` is dropped so telnet style peers interoperate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatCodec;

impl ChatCodec {
    fn to_unit(bytes: &[u8]) -> Result<String, ProtocolError> {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        if bytes.len() > MAX_UNIT_LEN {
            return Err(ProtocolError::UnitTooLong { len: bytes.len() });
        }

        str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }
}

impl Decoder for ChatCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|b| *b == DELIMITER) {
            Some(pos) => {
                let line = src.split_to(pos + 1);
                Self::to_unit(&line[..pos]).map(Some)
            }
            // +1 leaves room for a trailing '\r' still in flight
            None if src.len() > MAX_UNIT_LEN + 1 => {
                debug!("unterminated unit of {} bytes", src.len());
                Err(ProtocolError::UnitTooLong { len: src.len() })
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(unit) = self.decode(src)? {
            return Ok(Some(unit));
        }

        if src.is_empty() {
            return Ok(None);
        }

        // peer closed without a final delimiter, deliver what is left
        let rest = src.split_to(src.len());
        Self::to_unit(&rest).map(Some)
    }
}

impl<T: AsRef<str>> Encoder<T> for ChatCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let unit = item.as_ref();
        check_unit(unit)?;

        dst.reserve(unit.len() + 1);
        dst.put_slice(unit.as_bytes());
        dst.put_u8(DELIMITER);
        Ok(())
    }
}
