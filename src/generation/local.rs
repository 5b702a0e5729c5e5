//! Local text-generation model backend.
//!
//! Talks to a self-hosted model server using the Hugging Face
//! text-generation request format:
//!
//! ```json
//! { "inputs": "<prompt>", "parameters": { "max_new_tokens": 100, "num_beams": 5, ... } }
//! ```
//!
//! and accepts either `[{"generated_text": "..."}]` or
//! `{"generated_text": "..."}` in reply. `return_full_text` is requested so
//! the output is the prompt followed by the continuation, which is what
//! [`clean_local_response`](super::clean_local_response) expects.
//!
//! Set `HF_API_TOKEN` to send a bearer token with each request.

use async_trait::async_trait;
use std::time::Duration;

use super::{DecodingParams, GenerationError, TextGenerator};
use crate::config::LocalModelConfig;

const BACKEND: &str = "local";

pub struct LocalModelBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    token: Option<String>,
}

impl LocalModelBackend {
    /// Creates the backend and, when `health_url` is configured, checks that
    /// the model server answers before reporting the model as loaded.
    pub async fn connect(config: &LocalModelConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("chatbot.local.url is not configured"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if let Some(health_url) = &config.health_url {
            let resp = client.get(health_url).send().await.map_err(|e| {
                anyhow::anyhow!(
                    "Local model connection error (is it running at {}?): {}",
                    health_url,
                    e
                )
            })?;
            if !resp.status().is_success() {
                anyhow::bail!("Local model health check returned {}", resp.status());
            }
        }

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            token: std::env::var("HF_API_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl TextGenerator for LocalModelBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &DecodingParams,
    ) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": params.max_new_tokens,
                "num_beams": params.num_beams,
                "no_repeat_ngram_size": params.no_repeat_ngram_size,
                "top_p": params.top_p,
                "temperature": params.temperature,
                "do_sample": params.do_sample,
                "return_full_text": true,
            },
        });

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
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

        parse_generated_text(&json)
    }
}

fn parse_generated_text(json: &serde_json::Value) -> Result<String, GenerationError> {
    let item = match json.as_array() {
        Some(items) => items.first(),
        None => Some(json),
    };

    item.and_then(|i| i.get("generated_text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| GenerationError::Malformed {
            backend: BACKEND,
            reason: "missing generated_text".to_string(),
        })
}
