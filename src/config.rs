//! Configuration management

use crate::completion::{DEFAULT_API_URL, DEFAULT_MODEL};
use crate::conversation::RelayMode;
use crate::history::{DEFAULT_BACKUP_PATH, DEFAULT_HISTORY_PATH};
use crate::tokenizer::{DEFAULT_TOKEN_LIMIT, MIN_RESPONSE_TOKENS};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Bot configuration
#[derive(Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,

    /// Completion API key
    pub together_api_key: String,

    /// Completion model name
    pub model: String,

    /// Completion API base URL
    pub api_url: String,

    /// Channels the bot answers in
    pub allowed_channels: Vec<u64>,

    /// Stateful (history) or stateless relay
    pub mode: RelayMode,

    /// Primary history document
    pub history_path: PathBuf,

    /// Backup history document
    pub backup_path: PathBuf,

    /// Model context limit (tokens)
    pub token_limit: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"<redacted>")
            .field("together_api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("allowed_channels", &self.allowed_channels)
            .field("mode", &self.mode)
            .field("history_path", &self.history_path)
            .field("backup_path", &self.backup_path)
            .field("token_limit", &self.token_limit)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Load configuration from a variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let discord_token = get("DISCORD_BOT_TOKEN")
            .ok_or_else(|| anyhow::anyhow!("DISCORD_BOT_TOKEN not set"))?;
        let together_api_key = get("TOGETHER_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("TOGETHER_API_KEY not set"))?;

        let model = get("TOGETHER_MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_url = get("TOGETHER_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let mut allowed_channels = Vec::new();
        for key in ["ALLOWED_CHANNEL_ID", "ALLOWED_CHANNEL_IDS"] {
            if let Some(value) = get(key) {
                for id in parse_channel_ids(&value).with_context(|| format!("invalid {}", key))? {
                    if !allowed_channels.contains(&id) {
                        allowed_channels.push(id);
                    }
                }
            }
        }
        if allowed_channels.is_empty() {
            anyhow::bail!("ALLOWED_CHANNEL_ID or ALLOWED_CHANNEL_IDS must name at least one channel");
        }

        let mode = match get("RELAY_MODE") {
            Some(v) => v.parse()?,
            None => RelayMode::default(),
        };

        let history_path = get("HISTORY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_PATH));
        let backup_path = get("HISTORY_BACKUP_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_PATH));

        let token_limit = match get("TOKEN_LIMIT") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid TOKEN_LIMIT '{}'", v))?,
            None => DEFAULT_TOKEN_LIMIT,
        };
        if token_limit <= MIN_RESPONSE_TOKENS {
            anyhow::bail!(
                "TOKEN_LIMIT must be greater than {} (got {})",
                MIN_RESPONSE_TOKENS,
                token_limit
            );
        }

        Ok(Self {
            discord_token,
            together_api_key,
            model,
            api_url,
            allowed_channels,
            mode,
            history_path,
            backup_path,
            token_limit,
        })
    }

    /// One-line description for the startup banner (no secrets)
    pub fn summary(&self) -> String {
        let mut s = format!(
            "mode={}, model={}, api={}, channels={:?}, token_limit={}",
            self.mode.as_str(),
            self.model,
            self.api_url,
            self.allowed_channels,
            self.token_limit
        );
        if self.mode == RelayMode::Stateful {
            s.push_str(&format!(
                ", history={}, backup={}",
                self.history_path.display(),
                self.backup_path.display()
            ));
        }
        s
    }
}

/// Parse a comma-separated list of channel IDs
fn parse_channel_ids(value: &str) -> Result<Vec<u64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u64>() {
            Ok(0) => anyhow::bail!("channel id must be non-zero"),
            Ok(id) => Ok(id),
            Err(_) => anyhow::bail!("'{}' is not a channel id", s),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DISCORD_BOT_TOKEN", "discord-secret"),
            ("TOGETHER_API_KEY", "together-secret"),
            ("ALLOWED_CHANNEL_ID", "42"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(&required())).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.allowed_channels, vec![42]);
        assert_eq!(config.mode, RelayMode::Stateful);
        assert_eq!(config.history_path, PathBuf::from("chat_history.json"));
        assert_eq!(config.backup_path, PathBuf::from("chat_history_backup.json"));
        assert_eq!(config.token_limit, 8193);
    }

    #[test]
    fn test_missing_credentials_are_fatal() {
        for missing in ["DISCORD_BOT_TOKEN", "TOGETHER_API_KEY"] {
            let pairs: Vec<_> = required().into_iter().filter(|(k, _)| *k != missing).collect();
            let err = Config::from_vars(vars(&pairs)).unwrap_err();
            assert!(err.to_string().contains(missing));
        }
    }

    #[test]
    fn test_blank_credential_is_missing() {
        let mut pairs = required();
        pairs[0] = ("DISCORD_BOT_TOKEN", "   ");
        assert!(Config::from_vars(vars(&pairs)).is_err());
    }

    #[test]
    fn test_channel_lists_are_merged() {
        let mut pairs = required();
        pairs.push(("ALLOWED_CHANNEL_IDS", "7, 42 ,9,"));
        let config = Config::from_vars(vars(&pairs)).unwrap();
        assert_eq!(config.allowed_channels, vec![42, 7, 9]);
    }

    #[test]
    fn test_invalid_channels() {
        let mut pairs = required();
        pairs[2] = ("ALLOWED_CHANNEL_ID", "0");
        assert!(Config::from_vars(vars(&pairs)).is_err());

        pairs[2] = ("ALLOWED_CHANNEL_ID", "general");
        assert!(Config::from_vars(vars(&pairs)).is_err());

        let pairs: Vec<_> = required().into_iter().take(2).collect();
        assert!(Config::from_vars(vars(&pairs)).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut pairs = required();
        pairs.extend([
            ("TOGETHER_MODEL_NAME", "mistral"),
            ("RELAY_MODE", "stateless"),
            ("HISTORY_PATH", "/var/lib/relay/h.json"),
            ("TOKEN_LIMIT", "4096"),
        ]);
        let config = Config::from_vars(vars(&pairs)).unwrap();
        assert_eq!(config.model, "mistral");
        assert_eq!(config.mode, RelayMode::Stateless);
        assert_eq!(config.history_path, PathBuf::from("/var/lib/relay/h.json"));
        assert_eq!(config.token_limit, 4096);

        pairs.push(("TOKEN_LIMIT", "lots"));
        assert!(Config::from_vars(vars(&pairs)).is_err());
    }

    #[test]
    fn test_token_limit_must_leave_room() {
        for limit in ["0", "50", "100"] {
            let mut pairs = required();
            pairs.push(("TOKEN_LIMIT", limit));
            let err = Config::from_vars(vars(&pairs)).unwrap_err();
            assert!(err.to_string().contains("TOKEN_LIMIT"));
        }

        let mut pairs = required();
        pairs.push(("TOKEN_LIMIT", "101"));
        assert_eq!(Config::from_vars(vars(&pairs)).unwrap().token_limit, 101);
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = Config::from_vars(vars(&required())).unwrap();
        let summary = config.summary();
        assert!(!summary.contains("discord-secret"));
        assert!(!summary.contains("together-secret"));
        assert!(summary.contains("mode=stateful"));

        let debug = format!("{:?}", config);
        assert!(!debug.contains("discord-secret"));
        assert!(!debug.contains("together-secret"));
    }
}
