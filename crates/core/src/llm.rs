//! Language model access. The composer only sees the `LanguageModel` trait;
//! `OpenAiChatModel` talks to OpenAI-compatible `/chat/completions` endpoints.

use crate::config::{Credential, GenerationSettings};
use crate::embeddings::is_retryable_status;
use crate::error::GenerationError;
use crate::retry::{with_retry, RetryError, RetryPolicy};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One stateless completion: a system role plus a single user turn.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, GenerationError>;
}

pub struct OpenAiChatModel {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl OpenAiChatModel {
    pub fn new(
        credential: &Credential,
        settings: &GenerationSettings,
        retry: RetryPolicy,
    ) -> Result<Self, GenerationError> {
        if credential.is_empty() {
            return Err(GenerationError::Fatal("missing API key".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", credential.expose().trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| GenerationError::Fatal("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .default_headers(headers)
            .build()
            .map_err(|error| GenerationError::Fatal(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            retry,
        })
    }

    async fn complete_once(&self, request: &CompletionRequest<'_>) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() || error.is_connect() || error.is_request() {
                    GenerationError::Transient(error.to_string())
                } else {
                    GenerationError::Fatal(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = serde_json::from_str::<ApiError>(&text)
                .map(|error| error.error.message)
                .unwrap_or(text);
            let details = format!("{status}: {message}");
            return Err(if is_retryable_status(status) {
                GenerationError::Transient(details)
            } else {
                GenerationError::Fatal(details)
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| GenerationError::Fatal(format!("malformed chat response: {error}")))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion succeeded"
            );
        }

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyContent)
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, GenerationError> {
        with_retry(&self.retry, "chat completion", || self.complete_once(request))
            .await
            .map_err(|error| match error {
                RetryError::Permanent(error) => error,
                RetryError::Exhausted { attempts, last } => {
                    GenerationError::Fatal(format!("gave up after {attempts} attempts: {last}"))
                }
            })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
