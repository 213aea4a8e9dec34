/// LLM Client — the single point of entry for all Azure OpenAI calls.
///
/// ARCHITECTURAL RULE: No other module may call the OpenAI endpoints directly.
/// Chat completions (text cleanup, contact extraction, job descriptions) and
/// embeddings both go through this module.
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OpenAiConfig;
use crate::retry::{is_retryable_status, is_retryable_transport, RetryPolicy};

pub mod prompts;

const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Gave up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LlmError {
    /// Whether a later attempt could plausibly succeed (rate limits, outages, timeouts).
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(e) => is_retryable_transport(e),
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::RetriesExhausted { .. } => true,
            LlmError::Parse(_) | LlmError::EmptyContent | LlmError::InvalidInput(_) => false,
        }
    }
}

/// Prompt/completion seam. Normalization and description generation depend on
/// this trait rather than on the concrete client.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Extracts the text of the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

/// The single LLM client used by all services.
/// Wraps the Azure OpenAI REST API with retry on transient failures.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    chat_url: String,
    embeddings_url: String,
    chat_deployment: String,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(config: &OpenAiConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build OpenAI HTTP client")?;
        let base = config.api_base.trim_end_matches('/');
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            chat_url: deployment_url(base, &config.chat_deployment, "chat/completions", &config.api_version),
            embeddings_url: deployment_url(
                base,
                &config.embedding_deployment,
                "embeddings",
                &config.api_version,
            ),
            chat_deployment: config.chat_deployment.clone(),
            retry,
        })
    }

    pub fn chat_deployment(&self) -> &str {
        &self.chat_deployment
    }

    /// Makes a raw chat completion call, returning the full response object.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<ChatResponse, LlmError> {
        let request_body = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response: ChatResponse = self.post_with_retry(&self.chat_url, &request_body).await?;
        if let Some(usage) = &response.usage {
            debug!(
                "Chat call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(response)
    }

    /// Embeds a single text with the configured embedding deployment.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if text.trim().is_empty() {
            return Err(LlmError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }
        let response: EmbeddingResponse = self
            .post_with_retry(&self.embeddings_url, &EmbeddingRequest { input: text })
            .await?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyContent)
    }

    /// POSTs JSON, retrying 429/5xx and transport failures with exponential backoff.
    async fn post_with_retry<B, T>(&self, url: &str, body: &B) -> Result<T, LlmError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                warn!(
                    "OpenAI call attempt {} failed, retrying after {}ms...",
                    attempt,
                    self.retry.delay_for(attempt).as_millis()
                );
            }
            self.retry.backoff(attempt).await;

            let response = self
                .client
                .post(url)
                .header("api-key", &self.api_key)
                .header("content-type", "application/json")
                .json(body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) if is_retryable_transport(&e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
                Err(e) => return Err(LlmError::Http(e)),
            };

            let status = response.status();

            if is_retryable_status(status) {
                let body = response.text().await.unwrap_or_default();
                warn!("OpenAI API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: parse_error_message(body),
                });
            }

            let text = response.text().await?;
            return serde_json::from_str(&text).map_err(LlmError::Parse);
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.retry.max_attempts,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no response".to_string()),
        })
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let response = self.call(prompt, system).await?;
        response
            .text()
            .map(|t| t.trim().to_string())
            .ok_or(LlmError::EmptyContent)
    }
}

fn deployment_url(base: &str, deployment: &str, operation: &str, api_version: &str) -> String {
    format!("{base}/openai/deployments/{deployment}/{operation}?api-version={api_version}")
}

/// Pulls `error.message` out of an OpenAI error body, falling back to the raw body.
fn parse_error_message(body: String) -> String {
    serde_json::from_str::<OpenAiError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}
