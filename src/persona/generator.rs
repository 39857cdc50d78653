//! Text-generation collaborator used for custom personas.
//!
//! [`ChatCompletionsGenerator`] talks to any OpenAI-compatible
//! `/chat/completions` endpoint via `reqwest`. Failures are returned as
//! [`GenerationError`]; the persona selector turns them into "no change".

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::GeneratorConfig;
use crate::error::GenerationError;

/// Produces descriptor text for a wrapped prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync + fmt::Debug {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible provider
// ---------------------------------------------------------------------------

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Generator backed by an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct ChatCompletionsGenerator {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    timeout: Duration,
    max_retries: u32,
}

impl ChatCompletionsGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            timeout: Duration::try_from_secs_f64(config.timeout_secs.max(1.0))
                .unwrap_or(DEFAULT_TIMEOUT),
            max_retries: 2,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Request body for a single-turn completion.
    pub fn build_request_body(&self, prompt: &str) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
        })
    }

    /// Pull the first choice's text out of a completions response.
    pub fn parse_response(response: &Value) -> Result<String, GenerationError> {
        let message = response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| GenerationError::Malformed("no choices in response".to_string()))?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .map(str::trim)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        if let Some(usage) = response.get("usage") {
            log::debug!(
                "Persona generation token usage: prompt={}, completion={}",
                usage.get("prompt_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
                usage.get("completion_tokens").and_then(|v| v.as_i64()).unwrap_or(0),
            );
        }

        Ok(content.to_string())
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_ref().ok_or(GenerationError::MissingApiKey)?;
        let body = self.build_request_body(prompt);
        let endpoint = self.endpoint();

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let mut last_error = GenerationError::Request("no attempt made".to_string());
        let mut retry_delay = Duration::from_secs(1);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                log::warn!(
                    "Persona generation retry attempt {} after {:?}",
                    attempt,
                    retry_delay
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let response = match client
                .post(&endpoint)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = GenerationError::Request(e.to_string());
                    continue;
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_error = GenerationError::Request(e.to_string());
                    continue;
                }
            };

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_error = GenerationError::Http {
                    status: status.as_u16(),
                    body: text,
                };
                continue;
            }
            if !status.is_success() {
                return Err(GenerationError::Http {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let json: Value = serde_json::from_str(&text).map_err(|e| {
                GenerationError::Malformed(format!(
                    "{} - body: {}",
                    e,
                    text.chars().take(200).collect::<String>()
                ))
            })?;
            return Self::parse_response(&json);
        }

        Err(last_error)
    }
}

// ---------------------------------------------------------------------------
// Disabled provider
// ---------------------------------------------------------------------------

/// Generator used when no provider is configured; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::MissingApiKey)
    }
}
