//! Delivery sinks.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::subscription::ChannelId;
use crate::{RelayError, Result};

/// How the receiving side should render a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Rich text (Markdown-style markup).
    Markup,
    /// Plain text, no markup interpretation.
    Plain,
}

/// Destination for delivery units.
///
/// A failed `Markup` send is retried once as `Plain`, so implementations
/// should report markup problems as errors rather than sending garbled text.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Send a block of text to a channel.
    async fn send(&self, channel_id: ChannelId, text: &str, mode: RenderMode) -> Result<()>;
}

/// Sink that writes every message to stdout.
///
/// Used by the standalone binary, where no chat transport is attached.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    // Serializes writes so concurrent messages don't interleave.
    lock: Mutex<()>,
}

impl ConsoleSink {
    /// Create a console sink.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliverySink for ConsoleSink {
    async fn send(&self, channel_id: ChannelId, text: &str, mode: RenderMode) -> Result<()> {
        let _guard = self.lock.lock().await;
        let tag = match mode {
            RenderMode::Markup => "markup",
            RenderMode::Plain => "plain",
        };
        let line = format!("[{} {}]\n{}\n\n", channel_id, tag, text);

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| RelayError::Delivery(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| RelayError::Delivery(e.to_string()))?;
        Ok(())
    }
}
