//! Channel Trait Definitions
//!
//! Platform-neutral inbound message and outbound sender interface.

use async_trait::async_trait;

/// Error types for channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Universal inbound message representation
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// Platform message ID
    pub id: u64,

    /// Author identifier
    pub sender_id: u64,

    /// Author display name
    pub sender_name: Option<String>,

    /// Originating channel
    pub chat_id: u64,

    /// Raw message content
    pub content: String,

    /// Sent by this bot
    pub from_self: bool,

    /// Author holds administrative privilege in the hosting guild
    pub is_admin: bool,
}

impl ChannelMessage {
    /// Create a plain text message from a regular (non-admin) user
    pub fn text(sender_id: u64, chat_id: u64, content: &str) -> Self {
        Self {
            id: 0,
            sender_id,
            sender_name: None,
            chat_id,
            content: content.to_string(),
            from_self: false,
            is_admin: false,
        }
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    pub fn with_sender_name(mut self, name: &str) -> Self {
        self.sender_name = Some(name.to_string());
        self
    }

    pub fn from_self(mut self) -> Self {
        self.from_self = true;
        self
    }

    /// Name for log lines
    pub fn sender_label(&self) -> String {
        self.sender_name
            .clone()
            .unwrap_or_else(|| self.sender_id.to_string())
    }
}

/// Sender trait for outbound text
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Send one message (at most the platform limit) to a channel
    async fn send_text(&self, chat_id: u64, text: &str) -> Result<(), ChannelError>;

    /// Show a typing indicator
    async fn send_typing(&self, chat_id: u64) -> Result<(), ChannelError>;
}
