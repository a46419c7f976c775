//! Line-delimited stdio transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    Closed,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared writer emitting one JSON message per line.
///
/// Writes are serialized so concurrent responses and sampling requests never
/// interleave on the wire.
#[derive(Clone)]
pub struct LineWriter {
    inner: Arc<Mutex<BoxedWriter>>,
    closed: Arc<AtomicBool>,
}

impl LineWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Write a message as a single JSON line.
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut writer = self.inner.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Read the next non-empty line. `Ok(None)` at end of input.
pub(crate) async fn read_line<R>(reader: &mut R) -> Result<Option<String>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
}
