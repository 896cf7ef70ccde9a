//! HTTP scorer backed by the Anthropic Messages API or a local Ollama server.

use super::{build_prompt, parse_score_response, ScoreResponse, Scorer, ScoringError};
use crate::config::{LlmProvider, ModelConfig};
use crate::models::Market;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const RETRY_BASE_DELAY_MS: u64 = 200;

const SYSTEM_PROMPT: &str = "You are a product strategist analyzing market signals for the \
multilingual shopping experience of Hispanic and French-Canadian customers. \
You respond with a single JSON object and nothing else.";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Anthropic Messages API request.
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'static str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// Scores signals by prompting a hosted or local language model.
pub struct LlmScorer {
    http_client: reqwest::Client,
    provider: LlmProvider,
    api_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_seconds: u64,
    retries: usize,
}

impl LlmScorer {
    pub fn new(config: &ModelConfig, api_key: Option<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            provider: config.provider,
            api_url: config.effective_api_url(),
            api_key,
            model: config.name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_seconds: config.timeout_seconds,
            retries: config.retries,
        })
    }

    /// Worst-case wall time of one `score` call: every attempt plus the backoff sleeps.
    pub fn attempt_budget(&self) -> Duration {
        let attempts = self.retries as u64 + 1;
        let retries = self.retries as u64;
        let backoff_ms = RETRY_BASE_DELAY_MS * retries * (retries + 1) / 2;
        Duration::from_secs(self.timeout_seconds * attempts) + Duration::from_millis(backoff_ms)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ScoringError> {
        match self.provider {
            LlmProvider::Anthropic => self.complete_anthropic(prompt).await,
            LlmProvider::Ollama => self.complete_ollama(prompt).await,
        }
    }

    async fn complete_anthropic(&self, prompt: &str) -> Result<String, ScoringError> {
        let url = format!("{}/v1/messages", self.api_url);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
        };

        let mut builder = self
            .http_client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder.send().await.map_err(|e| self.send_error(e))?;
        let body = self.success_body(response).await?;

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| ScoringError::InvalidResponse(format!("unexpected API payload: {}", e)))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();

        if text.trim().is_empty() {
            return Err(ScoringError::InvalidResponse(
                "response has no text content".to_string(),
            ));
        }

        Ok(text)
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<String, ScoringError> {
        let url = format!("{}/api/chat", self.api_url);
        let request = OllamaChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let body = self.success_body(response).await?;

        let parsed: OllamaChatResponse = serde_json::from_str(&body)
            .map_err(|e| ScoringError::InvalidResponse(format!("unexpected API payload: {}", e)))?;

        Ok(parsed.message.content)
    }

    fn send_error(&self, e: reqwest::Error) -> ScoringError {
        if e.is_timeout() {
            ScoringError::Timeout(self.timeout_seconds)
        } else if e.is_connect() {
            ScoringError::Transport(format!("cannot connect to {} at {}", self.provider, self.api_url))
        } else {
            ScoringError::Transport(e.to_string())
        }
    }

    async fn success_body(&self, response: reqwest::Response) -> Result<String, ScoringError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| self.send_error(e))?;

        if !status.is_success() {
            return Err(ScoringError::Api {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl Scorer for LlmScorer {
    async fn score(&self, market: Market, text: &str) -> Result<ScoreResponse, ScoringError> {
        if text.trim().is_empty() {
            return Err(ScoringError::EmptyInput);
        }

        let prompt = build_prompt(market, text);
        let mut attempt = 0;

        loop {
            match self.complete(&prompt).await {
                Ok(raw) => {
                    debug!("Model response ({} chars)", raw.len());
                    return parse_score_response(&raw);
                }
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!("Scoring attempt {} failed: {}. Retrying", attempt, e);
                    tokio::time::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}
