/// LLM Client: the single point of entry for all OpenAI API calls in Promptr.
///
/// No other module talks to the provider directly. Handlers depend on the
/// [`LlmProvider`] trait, carried in `AppState` as `Arc<dyn LlmProvider>`.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned no {0}")]
    EmptyContent(&'static str),
}

/// A model as listed by the provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteModel {
    pub id: String,
    #[serde(default)]
    pub owned_by: String,
    #[serde(default)]
    pub created: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    /// Metadata persisted alongside the generation output.
    pub fn metadata(&self) -> Value {
        serde_json::json!({
            "finish_reason": self.finish_reason,
            "usage": self.usage,
        })
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider key stored with catalogued models, e.g. "openai".
    fn provider(&self) -> &str;

    async fn list_models(&self) -> Result<Vec<RemoteModel>, LlmError>;

    async fn embed(&self, model: &str, input: &str) -> Result<Vec<f64>, LlmError>;

    /// Sends `prompt` as a single user message.
    async fn complete(&self, model: &str, prompt: &str) -> Result<Completion, LlmError>;
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<RemoteModel>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

/// OpenAI REST client.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    api_base: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, api_base: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, LlmError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn api_error(status: u16, body: String) -> LlmError {
    let message = serde_json::from_str::<OpenAiError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    LlmError::Api { status, message }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn list_models(&self) -> Result<Vec<RemoteModel>, LlmError> {
        let response = self
            .client
            .get(self.url("models"))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let list: ModelList = Self::parse(response).await?;
        debug!("Listed {} provider models", list.data.len());
        Ok(list.data)
    }

    async fn embed(&self, model: &str, input: &str) -> Result<Vec<f64>, LlmError> {
        let response = self
            .client
            .post(self.url("embeddings"))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { model, input })
            .send()
            .await?;
        let parsed: EmbeddingResponse = Self::parse(response).await?;
        if let Some(usage) = &parsed.usage {
            debug!("Embedding call succeeded: model={model}, prompt_tokens={}", usage.prompt_tokens);
        }
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyContent("embedding"))
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<Completion, LlmError> {
        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
            })
            .send()
            .await?;
        let parsed: ChatResponse = Self::parse(response).await?;
        completion_from(parsed)
    }
}

fn completion_from(response: ChatResponse) -> Result<Completion, LlmError> {
    let usage = response.usage;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::EmptyContent("choices"))?;
    if let Some(usage) = &usage {
        debug!(
            "Chat call succeeded: prompt_tokens={}, completion_tokens={}",
            usage.prompt_tokens, usage.completion_tokens
        );
    }
    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        finish_reason: choice.finish_reason,
        usage,
    })
}
