//! Transport halves a chat session talks through.
//!
//! The writer owns the per-transport spelling of each request, so the
//! session driver only ever deals in names and text.

use async_trait::async_trait;

use protocol::{check_unit, datagram_line};

use crate::types::ClientError;

#[async_trait]
pub trait LinkWriter: Send {
    async fn join(&mut self, name: &str) -> Result<(), ClientError>;

    async fn chat(&mut self, name: &str, text: &str) -> Result<(), ClientError>;

    async fn exit(&mut self, name: &str) -> Result<(), ClientError>;

    /// Whether `text` still fits in one unit once relayed as `<name>: <text>`.
    fn chat_fits(&self, name: &str, text: &str) -> bool {
        check_unit(&datagram_line(name, text)).is_ok()
    }
}

#[async_trait]
pub trait LinkReader: Send {
    /// Next unit from the server, `None` once the server closed the link.
    /// Must be safe to cancel between units.
    async fn recv(&mut self) -> Result<Option<String>, ClientError>;
}
