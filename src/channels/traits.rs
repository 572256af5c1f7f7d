//! Channel abstraction for chat platforms.

use async_trait::async_trait;

/// An outgoing message to deliver on a channel.
#[derive(Debug, Clone)]
pub struct SendMessage {
    /// Message text.
    pub content: String,
    /// Platform-specific recipient (Discord user ID for DM delivery).
    pub recipient: String,
}

impl SendMessage {
    pub fn new(content: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            recipient: recipient.into(),
        }
    }
}

/// A chat platform the credential service runs on.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name ("discord").
    fn name(&self) -> &str;

    /// Deliver a message privately to a recipient.
    async fn send(&self, message: &SendMessage) -> anyhow::Result<()>;

    /// Run the channel's event loop until the process exits.
    /// Command handling happens inside the loop.
    async fn listen(&self) -> anyhow::Result<()>;

    /// Whether the platform API is currently reachable with our credentials.
    async fn health_check(&self) -> bool;
}
