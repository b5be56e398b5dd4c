//! Message Dispatcher
//!
//! Handles one inbound chat message to completion:
//! self/channel filtering, `!clean` / `!restore` / `!save` commands, the
//! completion round-trip and the chunked reply.
//!
//! The conversation lock is held for the whole handling of a message, so
//! messages are processed one at a time and their replies never interleave.

use crate::channels::{ChannelError, ChannelMessage, ChannelSender};
use crate::completion::CompletionBackend;
use crate::conversation::{Conversation, Prepared, RelayMode};
use crate::history::{HistoryError, RestoreOutcome, Turn};
use crate::tokenizer::{estimate_history, format_tokens};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Discord message length limit (characters)
pub const MAX_MESSAGE_LENGTH: usize = 2000;

pub const NO_ANSWER: &str = "Sorry, I couldn't generate a response.";
pub const PERMISSION_DENIED: &str = "🚫 You need administrator permission to clear the chat history.";
pub const HISTORY_CLEARED: &str = "🧹 Chat history cleared.";
pub const NO_BACKUP: &str = "⚠️ No backup found to restore.";
pub const BACKUP_SAVED: &str = "💾 Chat history saved to backup.";
pub const HISTORY_DISABLED: &str = "📴 Chat history is disabled in stateless mode.";

/// In-band chat commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Clear primary history (admin only)
    Clean,
    /// Restore primary history from backup
    Restore,
    /// Append primary history to backup
    Save,
}

impl Command {
    /// Exact, case-insensitive match after trimming
    pub fn parse(content: &str) -> Option<Self> {
        match content.trim().to_lowercase().as_str() {
            "!clean" => Some(Self::Clean),
            "!restore" => Some(Self::Restore),
            "!save" => Some(Self::Save),
            _ => None,
        }
    }
}

/// Split text into consecutive slices of at most `max_chars` characters
pub fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let split_at = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(split_at);
        chunks.push(chunk);
        rest = tail;
    }

    chunks
}

fn save_failed(e: &HistoryError) -> String {
    format!("⚠️ Failed to save chat history: {}", e)
}

fn over_budget(remaining: usize) -> String {
    format!(
        "⚠️ The conversation is too long to answer (only {} tokens left). \
         An admin can use `!clean` to start over.",
        remaining
    )
}

/// Relay between a chat channel and the completion API
pub struct Dispatcher {
    backend: Arc<dyn CompletionBackend>,
    conversation: Mutex<Conversation>,
    allowed_channels: Vec<u64>,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        conversation: Conversation,
        allowed_channels: Vec<u64>,
    ) -> Self {
        Self {
            backend,
            conversation: Mutex::new(conversation),
            allowed_channels,
        }
    }

    pub fn is_allowed(&self, chat_id: u64) -> bool {
        self.allowed_channels.contains(&chat_id)
    }

    /// Snapshot of the live history
    pub async fn history(&self) -> Vec<Turn> {
        self.conversation.lock().await.history().to_vec()
    }

    /// Handle one inbound message. Never fails: every error becomes a reply.
    pub async fn handle(&self, msg: &ChannelMessage, sender: &dyn ChannelSender) {
        if msg.from_self {
            return;
        }

        if !self.is_allowed(msg.chat_id) {
            info!("🚫 Ignoring message from unauthorized channel: {}", msg.chat_id);
            return;
        }

        info!(
            "📩 Received message: '{}' from {}",
            msg.content,
            msg.sender_label()
        );

        if let Some(command) = Command::parse(&msg.content) {
            self.handle_command(command, msg, sender).await;
            return;
        }

        let text = msg.content.trim();
        if text.is_empty() {
            warn!("🚨 Message was empty after stripping. Ignoring.");
            return;
        }

        self.handle_text(text, msg.chat_id, sender).await;
    }

    async fn handle_command(
        &self,
        command: Command,
        msg: &ChannelMessage,
        sender: &dyn ChannelSender,
    ) {
        let mut convo = self.conversation.lock().await;
        info!("Command {:?} from {}", command, msg.sender_label());

        let reply = if convo.mode() == RelayMode::Stateless {
            HISTORY_DISABLED.to_string()
        } else {
            match command {
                Command::Clean if !msg.is_admin => {
                    warn!("Denied !clean for non-admin {}", msg.sender_label());
                    PERMISSION_DENIED.to_string()
                }
                Command::Clean => match convo.clear() {
                    Ok(()) => HISTORY_CLEARED.to_string(),
                    Err(e) => {
                        error!("Failed to clear history: {}", e);
                        save_failed(&e)
                    }
                },
                Command::Restore => match convo.restore() {
                    Ok(RestoreOutcome::Restored(n)) => {
                        format!("♻️ Chat history restored from backup ({} messages).", n)
                    }
                    Ok(RestoreOutcome::NothingToRestore) => NO_BACKUP.to_string(),
                    Err(e) => {
                        error!("Failed to restore history: {}", e);
                        save_failed(&e)
                    }
                },
                Command::Save => match convo.backup() {
                    Ok(_) => BACKUP_SAVED.to_string(),
                    Err(e) => {
                        error!("Failed to save backup: {}", e);
                        save_failed(&e)
                    }
                },
            }
        };

        self.reply(sender, msg.chat_id, &reply).await;
    }

    async fn handle_text(&self, text: &str, chat_id: u64, sender: &dyn ChannelSender) {
        let mut convo = self.conversation.lock().await;

        if let Err(e) = convo.backup() {
            error!("Failed to snapshot history to backup: {}", e);
            self.reply(sender, chat_id, &save_failed(&e)).await;
        }

        let pending = match convo.prepare(text) {
            Prepared::Ready(pending) => pending,
            Prepared::OverBudget { remaining } => {
                warn!("Refusing request: only {} tokens left", remaining);
                self.reply(sender, chat_id, &over_budget(remaining)).await;
                return;
            }
        };

        debug!(
            "Request: model={}, turns={}, est_tokens={}, max_tokens={}, evicted={}",
            self.backend.model(),
            pending.messages.len(),
            format_tokens(estimate_history(&pending.messages)),
            pending.max_tokens,
            pending.evicted
        );

        if let Err(e) = sender.send_typing(chat_id).await {
            debug!("Typing indicator failed: {}", e);
        }

        let answer = match self
            .backend
            .complete(&pending.messages, pending.max_tokens)
            .await
        {
            Ok(answer) => answer
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            Err(e) => {
                let error_msg = format!("❌ API Error: {}", e);
                error!("{}", error_msg);
                self.reply(sender, chat_id, &error_msg).await;
                return;
            }
        };

        let persisted = convo.commit(pending, answer.as_deref());

        let reply = answer.as_deref().unwrap_or(NO_ANSWER);
        info!("🤖 Bot Response: {}", reply);
        self.reply(sender, chat_id, reply).await;

        if let Err(e) = persisted {
            error!("Failed to persist history: {}", e);
            self.reply(sender, chat_id, &save_failed(&e)).await;
        }
    }

    /// Send a reply, logging instead of propagating send failures
    async fn reply(&self, sender: &dyn ChannelSender, chat_id: u64, text: &str) {
        if let Err(e) = self.send_long_message(sender, chat_id, text).await {
            error!("Failed to send reply to channel {}: {}", chat_id, e);
        }
    }

    /// Send text in order as consecutive chunks of the platform limit
    pub async fn send_long_message(
        &self,
        sender: &dyn ChannelSender,
        chat_id: u64,
        text: &str,
    ) -> Result<(), ChannelError> {
        for chunk in split_message(text, MAX_MESSAGE_LENGTH) {
            sender.send_text(chat_id, chunk).await?;
        }
        Ok(())
    }
}
