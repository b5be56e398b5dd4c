//! RelayBot
//!
//! Discord to LLM completion relay with persistent chat history.
//!
//! # Features
//!
//! - **Channel allow-list**: answers only in configured channels
//! - **Chat history**: bounded token window, persisted to JSON
//! - **Backup/restore**: `!save`, `!restore`, admin-only `!clean`
//! - **Chunked replies**: responses split at the 2000-character limit
//! - **Profiles**: stateful (history) or stateless (single-shot) relay
//!
//! # Architecture
//!
//! ```text
//! Discord ──► DiscordHandler ──► Dispatcher ──► Completion API
//! (gateway)    (serenity)           │             (Together)
//!                                   ├── Conversation (owned, locked)
//!                                   ├── TokenBudget (window + max_tokens)
//!                                   └── HistoryStore (primary + backup JSON)
//! ```

pub mod channels;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod history;
pub mod tokenizer;

pub use channels::{ChannelError, ChannelMessage, ChannelSender, DiscordHandler, DiscordSender};
pub use completion::{CompletionBackend, CompletionError, TogetherClient};
pub use config::Config;
pub use conversation::{Conversation, PendingExchange, Prepared, RelayMode};
pub use dispatcher::{Command, Dispatcher};
pub use history::{HistoryError, HistoryStore, RestoreOutcome, Role, Turn};
pub use tokenizer::{BudgetCheck, TokenBudget};
