use std::sync::Arc;

use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

// Clears the current terminal line before printing over the prompt
const CLEAR_LINE: &str = "\r\x1b[K";

/// Terminal output shared by the input loop and the receive task.
pub struct Console<O> {
    out: Arc<Mutex<O>>,
    prompt: String,
}

impl<O> Clone for Console<O> {
    fn clone(&self) -> Self {
        Console {
            out: Arc::clone(&self.out),
            prompt: self.prompt.clone(),
        }
    }
}

impl<O: AsyncWrite + Unpin + Send> Console<O> {
    pub fn new(output: O, name: &str) -> Self {
        Console {
            out: Arc::new(Mutex::new(output)),
            prompt: format!("{}: ", name),
        }
    }

    pub async fn prompt(&self) -> io::Result<()> {
        self.write(&self.prompt).await
    }

    /// Prints an incoming line and redraws the prompt under it.
    pub async fn message(&self, line: &str) -> io::Result<()> {
        self.write(&format!("{}{}\n{}", CLEAR_LINE, line, self.prompt)).await
    }

    pub async fn notice(&self, line: &str) -> io::Result<()> {
        self.write(&format!("{}{}\n", CLEAR_LINE, line)).await
    }

    async fn write(&self, text: &str) -> io::Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.flush().await
    }
}
