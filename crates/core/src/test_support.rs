use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::error::{EmbeddingError, GenerationError};
use crate::llm::{CompletionRequest, LanguageModel};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Whitespace-separated words, cut to exactly `len` characters.
pub(crate) fn resume_text(len: usize) -> String {
    let vocabulary = [
        "Rust", "Python", "Kubernetes", "PostgreSQL", "led", "migration", "latency", "team",
        "shipped", "observability", "Terraform", "mentored",
    ];
    let mut text = String::new();
    let mut position = 0;
    while text.chars().count() < len {
        text.push_str(vocabulary[position % vocabulary.len()]);
        text.push(' ');
        position += 1;
    }
    text.chars().take(len).collect()
}

/// Local embedder that counts batch calls and can be slowed down or broken.
pub(crate) struct CountingEmbedder {
    inner: CharacterNgramEmbedder,
    model_id: String,
    calls: AtomicUsize,
    delay: Duration,
    failing: bool,
}

impl Default for CountingEmbedder {
    fn default() -> Self {
        Self::with_inner(CharacterNgramEmbedder::default())
    }
}

impl CountingEmbedder {
    pub(crate) fn with_inner(inner: CharacterNgramEmbedder) -> Self {
        Self {
            model_id: inner.model_id().to_string(),
            inner,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            failing: false,
        }
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Same vectors, reported under another model id.
    pub(crate) fn renamed(self, model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            ..self
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing {
            return Err(EmbeddingError::Fatal("401 invalid api key".to_string()));
        }
        self.inner.embed(texts).await
    }
}

type Reply = Box<dyn Fn(&str) -> Result<String, GenerationError> + Send + Sync>;

/// Language model answering from a closure over the user prompt.
pub(crate) struct ScriptedModel {
    reply: Reply,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub(crate) fn new(
        reply: impl Fn(&str) -> Result<String, GenerationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn answering(text: &'static str) -> Self {
        Self::new(move |_| Ok(text.to_string()))
    }

    /// `(system, prompt)` pairs in call order.
    pub(crate) fn prompts(&self) -> Vec<(String, String)> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((request.system.to_string(), request.prompt.to_string()));
        (self.reply)(request.prompt)
    }
}

/// Local HTTP endpoint answering one connection per canned `(status, body)`
/// pair, in order, and recording every request body it receives.
pub(crate) struct CannedServer {
    pub(crate) base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    pub(crate) async fn start(responses: Vec<(u16, String)>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let Ok(request) = read_request_body(&mut socket).await else {
                    return;
                };
                recorded
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(request);

                let response = format!(
                    "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Ok(Self { base_url, requests })
    }

    /// Parsed JSON bodies of the requests served so far.
    pub(crate) fn requests(&self) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|body| serde_json::from_str(body).unwrap_or(serde_json::Value::Null))
            .collect()
    }
}

async fn read_request_body(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            return Ok(String::new());
        }
        buffer.extend_from_slice(&chunk[..read]);

        let Some(header_end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
        let length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let body_start = header_end + 4;
        if buffer.len() >= body_start + length {
            return Ok(String::from_utf8_lossy(&buffer[body_start..body_start + length]).into_owned());
        }
    }
}
