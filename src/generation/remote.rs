//! OpenAI-compatible chat-completions backend.
//!
//! Calls `POST {base_url}/chat/completions` with the configured model and
//! fixed sampling parameters. The backend is only constructed when the
//! `OPENAI_API_KEY` environment variable is present; its presence is what
//! marks the remote path as configured.
//!
//! A single attempt is made per request. The request is bounded by the
//! client timeout and the `max_tokens` cap; any failure is reported to the
//! strategy selector, which falls through to the next strategy.

use async_trait::async_trait;
use std::time::Duration;

use super::{ChatBackend, ChatMessage, GenerationError};
use crate::config::RemoteConfig;

const BACKEND: &str = "remote";

/// Environment variable holding the remote API credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct RemoteChatBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
    max_tokens: u32,
}

impl RemoteChatBackend {
    /// Builds the backend when `OPENAI_API_KEY` is set and non-empty.
    pub fn from_env(config: &RemoteConfig) -> anyhow::Result<Option<Self>> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(Some(Self::new(config, key)?)),
            _ => Ok(None),
        }
    }

    pub fn new(config: &RemoteConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatBackend for RemoteChatBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|source| GenerationError::Request {
                backend: BACKEND,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                backend: BACKEND,
                status,
                body,
            });
        }

        let json: serde_json::Value =
            response
                .json()
                .await
                .map_err(|source| GenerationError::Request {
                    backend: BACKEND,
                    source,
                })?;

        parse_completion(&json)
    }
}

/// Extracts `choices[0].message.content`, trimmed.
fn parse_completion(json: &serde_json::Value) -> Result<String, GenerationError> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| GenerationError::Malformed {
            backend: BACKEND,
            reason: "missing choices[0].message.content".to_string(),
        })?;

    Ok(content.trim().to_string())
}
