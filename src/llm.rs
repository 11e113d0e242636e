//! Generation gateway.
//!
//! Wraps a pluggable chat-completion backend (OpenAI or a local Ollama
//! server) behind a single interface that never leaks a raw backend error:
//! every call returns a structured [`Completion`] with the answer text, token
//! usage when the backend reports it, and measured wall-clock latency. On any
//! transport or backend failure the answer is a fixed user-safe fallback and
//! `degraded` is set for logging.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::LlmConfig;
use crate::models::Completion;

/// Fallback answer returned when the backend call fails.
pub const FALLBACK_ANSWER: &str = "Sorry, I could not generate an answer at this time.";
/// Fixed answer for empty prompts; no backend call is made.
pub const EMPTY_PROMPT_ANSWER: &str = "Sorry, I could not understand the question.";

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// A prompt-to-completion backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Complete a prompt. Infallible at the boundary: failures are reported
    /// through [`Completion::degraded`], never as errors.
    async fn complete(&self, prompt: &str) -> Completion;
}

/// Instantiate the backend named by the configuration.
///
/// The OpenAI provider requires `OPENAI_API_KEY`; any provider other than
/// `"openai"` or `"ollama"` yields an offline echo backend useful for local
/// development and tests.
pub fn create_backend(config: &LlmConfig) -> anyhow::Result<Arc<dyn CompletionBackend>> {
    if config.provider == "openai" && std::env::var("OPENAI_API_KEY").is_err() {
        anyhow::bail!("OPENAI_API_KEY environment variable not set");
    }
    Ok(Arc::new(LlmClient::new(config)?))
}

/// HTTP chat-completion client dispatching on the configured provider.
pub struct LlmClient {
    provider: String,
    model: String,
    url: String,
    api_key: Option<String>,
    max_tokens: u32,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            provider: config.provider.clone(),
            model: config.model_name(),
            url: config.url.trim_end_matches('/').to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            max_tokens: config.max_tokens,
            client,
        })
    }

    async fn complete_openai(&self, prompt: &str) -> anyhow::Result<(String, Option<u64>)> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        // Newer reasoning models take max_completion_tokens instead of
        // max_tokens.
        let token_field = if self.model.starts_with("o4-") {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
        });
        body[token_field] = serde_json::json!(self.max_tokens);

        let resp = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let answer = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))?
            .to_string();

        let tokens_used = json
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(|t| t.as_u64());

        Ok((answer, tokens_used))
    }

    async fn complete_ollama(&self, prompt: &str) -> anyhow::Result<(String, Option<u64>)> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "stream": false,
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let answer = json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();

        let tokens_used = json.get("eval_count").and_then(|t| t.as_u64());

        Ok((answer, tokens_used))
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, prompt: &str) -> Completion {
        if prompt.trim().is_empty() {
            return Completion {
                answer: EMPTY_PROMPT_ANSWER.to_string(),
                tokens_used: None,
                latency_ms: 0.0,
                degraded: false,
            };
        }

        let start = Instant::now();

        let result = match self.provider.as_str() {
            "openai" => self.complete_openai(prompt).await,
            "ollama" => self.complete_ollama(prompt).await,
            other => Ok((format!("[LLM-{}]: {}", other, prompt), None)),
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok((answer, tokens_used)) => Completion {
                answer,
                tokens_used,
                latency_ms,
                degraded: false,
            },
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "generation backend failed");
                Completion {
                    answer: FALLBACK_ANSWER.to_string(),
                    tokens_used: None,
                    latency_ms,
                    degraded: true,
                }
            }
        }
    }
}
