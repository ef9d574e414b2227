use async_trait::async_trait;

use crate::types::{ChannelId, IncomingMessage, MessageHandle};

/// Errors raised by a chat transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(String),
    #[error("chat service rejected request: {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("transport closed")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Outbound chat operations the dispatcher depends on.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post `text` as a new message in `channel`.
    async fn send(&self, channel: ChannelId, text: &str) -> Result<MessageHandle, TransportError>;

    /// Replace the content of a message we posted.
    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), TransportError>;

    /// Up to `limit` most recent messages in `channel`, newest first.
    async fn fetch_history(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>, TransportError>;
}
