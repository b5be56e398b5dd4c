//! Conversation State
//!
//! The single owner of the in-memory history. The dispatcher keeps it behind
//! one async mutex, so every read-modify-persist sequence runs as a unit.
//!
//! An exchange is staged on a copy (`prepare`) and only replaces the live
//! history on `commit`, so a refused or failed request leaves it untouched.

use crate::history::{HistoryError, HistoryStore, RestoreOutcome, Turn};
use crate::tokenizer::{BudgetCheck, TokenBudget};
use std::str::FromStr;
use tracing::{debug, info};

/// Relay profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    /// History is loaded, sent with every request and persisted
    #[default]
    Stateful,
    /// Each request carries only the current message; nothing touches disk
    Stateless,
}

impl RelayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stateful => "stateful",
            Self::Stateless => "stateless",
        }
    }
}

impl FromStr for RelayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stateful" => Ok(Self::Stateful),
            "stateless" => Ok(Self::Stateless),
            other => anyhow::bail!("unknown relay mode '{}' (expected stateful or stateless)", other),
        }
    }
}

/// An exchange staged for the completion API
#[derive(Debug, Clone)]
pub struct PendingExchange {
    /// Messages to send, ending with the new user turn
    pub messages: Vec<Turn>,
    /// `max_tokens` for the response
    pub max_tokens: usize,
    /// Turns evicted to fit the window
    pub evicted: usize,
}

/// Result of staging an exchange
#[derive(Debug, Clone)]
pub enum Prepared {
    Ready(PendingExchange),
    OverBudget { remaining: usize },
}

/// Owned conversation history
pub struct Conversation {
    mode: RelayMode,
    store: Option<HistoryStore>,
    budget: TokenBudget,
    history: Vec<Turn>,
}

impl Conversation {
    /// Stateful conversation, history loaded from the primary document
    pub fn stateful(store: HistoryStore, budget: TokenBudget) -> Self {
        let history = store.load_primary();
        info!(
            "Loaded {} turns from {}",
            history.len(),
            store.primary_path().display()
        );
        Self {
            mode: RelayMode::Stateful,
            store: Some(store),
            budget,
            history,
        }
    }

    /// Stateless conversation, no persistence
    pub fn stateless(budget: TokenBudget) -> Self {
        Self {
            mode: RelayMode::Stateless,
            store: None,
            budget,
            history: Vec::new(),
        }
    }

    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Append the current history to the backup document.
    ///
    /// Returns the backup length, or `None` in stateless mode.
    pub fn backup(&self) -> Result<Option<usize>, HistoryError> {
        match &self.store {
            Some(store) => store.append_backup(&self.history).map(Some),
            None => Ok(None),
        }
    }

    /// Stage a user message: append, truncate, size the response.
    ///
    /// Does not modify the live history.
    pub fn prepare(&self, user_text: &str) -> Prepared {
        let mut messages = match self.mode {
            RelayMode::Stateful => self.history.clone(),
            RelayMode::Stateless => Vec::new(),
        };
        messages.push(Turn::user(user_text));

        let evicted = self.budget.truncate(&mut messages);
        if evicted > 0 {
            debug!("Evicted {} oldest turns to fit the window", evicted);
        }

        match self.budget.check(&messages) {
            BudgetCheck::Ok { max_tokens } => Prepared::Ready(PendingExchange {
                messages,
                max_tokens,
                evicted,
            }),
            BudgetCheck::Exceeded { remaining } => Prepared::OverBudget { remaining },
        }
    }

    /// Make a staged exchange live and persist it.
    ///
    /// `answer` is `None` when the API produced nothing; the user turn is kept
    /// without an assistant turn. Stateless mode discards the exchange.
    pub fn commit(
        &mut self,
        pending: PendingExchange,
        answer: Option<&str>,
    ) -> Result<(), HistoryError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let mut messages = pending.messages;
        if let Some(answer) = answer {
            messages.push(Turn::assistant(answer));
        }
        self.history = messages;
        store.save_primary(&self.history)
    }

    /// Empty the history and persist it
    pub fn clear(&mut self) -> Result<(), HistoryError> {
        match &self.store {
            Some(store) => store.clear_primary(&mut self.history),
            None => Ok(()),
        }
    }

    /// Replace the history with the backup contents
    pub fn restore(&mut self) -> Result<RestoreOutcome, HistoryError> {
        match &self.store {
            Some(store) => store.restore_primary_from_backup(&mut self.history),
            None => Ok(RestoreOutcome::NothingToRestore),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stateful(limit: usize) -> (Conversation, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("h.json"), dir.path().join("b.json"));
        (Conversation::stateful(store, TokenBudget::new(limit)), dir)
    }

    #[test]
    fn test_relay_mode_parse() {
        assert_eq!("stateful".parse::<RelayMode>().unwrap(), RelayMode::Stateful);
        assert_eq!(" Stateless ".parse::<RelayMode>().unwrap(), RelayMode::Stateless);
        assert!("chatty".parse::<RelayMode>().is_err());
    }

    #[test]
    fn test_prepare_does_not_touch_history() {
        let (convo, _dir) = stateful(8193);
        let Prepared::Ready(pending) = convo.prepare("Hello") else {
            panic!("expected Ready");
        };
        assert_eq!(pending.messages, vec![Turn::user("Hello")]);
        assert_eq!(pending.max_tokens, 1024);
        assert!(convo.history().is_empty());
    }

    #[test]
    fn test_commit_persists_exchange() {
        let (mut convo, dir) = stateful(8193);
        let Prepared::Ready(pending) = convo.prepare("Hello") else {
            panic!("expected Ready");
        };
        convo.commit(pending, Some("Hi!")).unwrap();

        assert_eq!(convo.history(), &[Turn::user("Hello"), Turn::assistant("Hi!")]);
        let store = HistoryStore::new(dir.path().join("h.json"), dir.path().join("b.json"));
        assert_eq!(store.load_primary(), convo.history());
    }

    #[test]
    fn test_commit_without_answer_keeps_user_turn() {
        let (mut convo, _dir) = stateful(8193);
        let Prepared::Ready(pending) = convo.prepare("Hello") else {
            panic!("expected Ready");
        };
        convo.commit(pending, None).unwrap();
        assert_eq!(convo.history(), &[Turn::user("Hello")]);
    }

    #[test]
    fn test_over_budget() {
        let (convo, _dir) = stateful(150);
        let long = vec!["w"; 60].join(" ");
        match convo.prepare(&long) {
            Prepared::OverBudget { remaining } => assert_eq!(remaining, 90),
            Prepared::Ready(_) => panic!("expected OverBudget"),
        }
    }

    #[test]
    fn test_stateless_sends_only_current_turn() {
        let mut convo = Conversation::stateless(TokenBudget::default());
        let Prepared::Ready(pending) = convo.prepare("first") else {
            panic!("expected Ready");
        };
        convo.commit(pending, Some("answer")).unwrap();
        assert!(convo.history().is_empty());

        let Prepared::Ready(pending) = convo.prepare("second") else {
            panic!("expected Ready");
        };
        assert_eq!(pending.messages, vec![Turn::user("second")]);
        assert_eq!(convo.backup().unwrap(), None);
        assert_eq!(convo.restore().unwrap(), RestoreOutcome::NothingToRestore);
    }
}
