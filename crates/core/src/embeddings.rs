use crate::config::{Credential, EmbeddingSettings};
use crate::error::EmbeddingError;
use crate::retry::{with_retry, RetryError, RetryPolicy};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Turns text into fixed-length vectors. Implementations batch internally.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the model; indices built by another model are rebuilt.
    fn model_id(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                expected: 1,
                found: vectors.len(),
            });
        }
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            found: 0,
        })
    }
}

/// Offline embedder hashing character trigrams into buckets.
#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
    model_id: String,
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("char-trigram-{dimensions}"),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    pub fn new(
        credential: &Credential,
        settings: &EmbeddingSettings,
        retry: RetryPolicy,
    ) -> Result<Self, EmbeddingError> {
        if credential.is_empty() {
            return Err(EmbeddingError::Fatal("missing API key".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", credential.expose().trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbeddingError::Fatal("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .default_headers(headers)
            .build()
            .map_err(|error| EmbeddingError::Fatal(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            batch_size: settings.batch_size.max(1),
            retry,
        })
    }

    async fn embed_batch_once(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let details = format!("{status}: {body}");
            return Err(if is_retryable_status(status) {
                EmbeddingError::Transient(details)
            } else {
                EmbeddingError::Fatal(details)
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingError::Fatal(format!("malformed embedding response: {error}")))?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: inputs.len(),
                found: parsed.data.len(),
            });
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(batch_no, batch_len = batch.len(), model = %self.model, "embedding batch");
            let embedded = with_retry(&self.retry, "embeddings", || self.embed_batch_once(batch))
                .await
                .map_err(escalate)?;
            vectors.extend(embedded);
        }

        Ok(vectors)
    }
}

/// Running out of retries turns a transient failure into a fatal one.
fn escalate(error: RetryError<EmbeddingError>) -> EmbeddingError {
    match error {
        RetryError::Permanent(error) => error,
        RetryError::Exhausted { attempts, last } => {
            EmbeddingError::Fatal(format!("gave up after {attempts} attempts: {last}"))
        }
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn classify_transport_error(error: reqwest::Error) -> EmbeddingError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        EmbeddingError::Transient(error.to_string())
    } else {
        EmbeddingError::Fatal(error.to_string())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
