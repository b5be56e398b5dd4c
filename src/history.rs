//! History Store
//!
//! Persists the conversation history (primary document) and the accumulated
//! pre-request snapshots (backup document) as pretty-printed JSON arrays of
//! `{role, content}` objects.
//!
//! Reads never fail: an absent or malformed document is empty history.
//! Writes go to a temp file that is renamed over the target, so a crash
//! mid-write leaves the previous document intact.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Default primary history document
pub const DEFAULT_HISTORY_PATH: &str = "chat_history.json";

/// Default backup history document
pub const DEFAULT_BACKUP_PATH: &str = "chat_history_backup.json";

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Error types for history persistence
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of a restore request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Primary replaced with this many turns from the backup
    Restored(usize),
    /// Backup was empty, primary untouched
    NothingToRestore,
}

/// JSON-document store for primary and backup history
#[derive(Debug, Clone)]
pub struct HistoryStore {
    primary_path: PathBuf,
    backup_path: PathBuf,
}

impl HistoryStore {
    pub fn new(primary_path: impl Into<PathBuf>, backup_path: impl Into<PathBuf>) -> Self {
        Self {
            primary_path: primary_path.into(),
            backup_path: backup_path.into(),
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary_path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Load the primary history (empty if absent or malformed)
    pub fn load_primary(&self) -> Vec<Turn> {
        read_document(&self.primary_path)
    }

    /// Overwrite the primary document
    pub fn save_primary(&self, history: &[Turn]) -> Result<(), HistoryError> {
        write_document(&self.primary_path, history)?;
        debug!("Saved {} turns to {}", history.len(), self.primary_path.display());
        Ok(())
    }

    /// Load the backup history (empty if absent or malformed)
    pub fn load_backup(&self) -> Vec<Turn> {
        read_document(&self.backup_path)
    }

    /// Append turns to the end of the backup document.
    ///
    /// Rewrites the whole document; returns the new backup length.
    pub fn append_backup(&self, turns: &[Turn]) -> Result<usize, HistoryError> {
        let mut backup = self.load_backup();
        backup.extend_from_slice(turns);
        write_document(&self.backup_path, &backup)?;
        debug!(
            "Appended {} turns to backup ({} total)",
            turns.len(),
            backup.len()
        );
        Ok(backup.len())
    }

    /// Replace `history` with an empty sequence and persist it.
    ///
    /// On a failed write `history` is left as it was.
    pub fn clear_primary(&self, history: &mut Vec<Turn>) -> Result<(), HistoryError> {
        self.save_primary(&[])?;
        let cleared = history.len();
        history.clear();
        info!("Cleared {} turns from primary history", cleared);
        Ok(())
    }

    /// Replace `history` with the backup contents and persist it.
    ///
    /// An empty backup leaves `history` and the primary document untouched.
    pub fn restore_primary_from_backup(
        &self,
        history: &mut Vec<Turn>,
    ) -> Result<RestoreOutcome, HistoryError> {
        let backup = self.load_backup();
        if backup.is_empty() {
            return Ok(RestoreOutcome::NothingToRestore);
        }

        self.save_primary(&backup)?;
        let restored = backup.len();
        *history = backup;
        info!("Restored {} turns from backup", restored);
        Ok(RestoreOutcome::Restored(restored))
    }
}

fn read_document(path: &Path) -> Vec<Turn> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Failed to read {}: {} (treating as empty)", path.display(), e);
            return Vec::new();
        }
    };

    let elements = match serde_json::from_slice::<Vec<serde_json::Value>>(&bytes) {
        Ok(elements) => elements,
        Err(e) => {
            warn!(
                "Malformed history document {}: {} (treating as empty)",
                path.display(),
                e
            );
            return Vec::new();
        }
    };

    // Skip bad entries instead of discarding the whole document
    let total = elements.len();
    let turns: Vec<Turn> = elements
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<Turn>(value) {
            Ok(turn) => Some(turn),
            Err(e) => {
                warn!("Skipping entry {} in {}: {}", i, path.display(), e);
                None
            }
        })
        .collect();
    if turns.len() < total {
        error!(
            "Dropped {} of {} entries from {}",
            total - turns.len(),
            total,
            path.display()
        );
    }
    turns
}

fn write_document(path: &Path, turns: &[Turn]) -> Result<(), HistoryError> {
    // serde_json writes non-ASCII as-is, no \u escaping
    let content = serde_json::to_string_pretty(turns)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let io_err = |source: std::io::Error| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(&tmp_path, content).map_err(io_err)?;
    std::fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}
