//! Completion API Client
//!
//! Client for an OpenAI-compatible chat completions endpoint (Together AI by
//! default). Sends the conversation window with a `max_tokens` budget and
//! returns the first choice's text.

use crate::history::Turn;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default completion API base URL
pub const DEFAULT_API_URL: &str = "https://api.together.xyz/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free";

/// Error types for completion requests
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
}

/// Anything that can turn a conversation into an answer
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Model identifier (for logging)
    fn model(&self) -> &str;

    /// Request a completion.
    ///
    /// `Ok(None)` means the API answered without any usable choice.
    async fn complete(
        &self,
        messages: &[Turn],
        max_tokens: usize,
    ) -> Result<Option<String>, CompletionError>;
}

/// API request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    max_tokens: usize,
}

/// API response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

impl ChatResponse {
    fn into_answer(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
    }
}

/// Together AI chat completions client
#[derive(Clone)]
pub struct TogetherClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl TogetherClient {
    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create from config
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::with_base_url(&config.together_api_key, &config.model, &config.api_url)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for TogetherClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Turn],
        max_tokens: usize,
    ) -> Result<Option<String>, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens,
        };

        debug!(
            "Calling completion API: model={}, messages={}, max_tokens={}",
            self.model,
            messages.len(),
            max_tokens
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, body });
        }

        let result: ChatResponse = response.json().await?;
        debug!("Full API response: {:?}", result);

        if let Some(usage) = &result.usage {
            info!(
                "Completion: model={}, in={}, out={}",
                self.model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(result.into_answer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let messages = vec![Turn::user("Hello"), Turn::assistant("Hi")];
        let request = ChatRequest {
            model: "m",
            messages: &messages,
            max_tokens: 1024,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "m",
                "messages": [
                    {"role": "user", "content": "Hello"},
                    {"role": "assistant", "content": "Hi"}
                ],
                "max_tokens": 1024
            })
        );
    }

    #[test]
    fn test_response_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [
                {"message": {"role": "assistant", "content": "first"}},
                {"message": {"role": "assistant", "content": "second"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(response.into_answer().as_deref(), Some("first"));
    }

    #[test]
    fn test_response_without_choices() {
        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(empty.into_answer(), None);

        let absent: ChatResponse = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert_eq!(absent.into_answer(), None);

        let null_content: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert_eq!(null_content.into_answer(), None);
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let client = TogetherClient::with_base_url("k", "m", "http://localhost:8080/v1/");
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(client.model(), "m");
    }
}
