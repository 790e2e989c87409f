use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("unsupported resume format: {0}")]
    UnsupportedFormat(String),

    #[error("document has no text: {0}")]
    EmptyDocument(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

/// Failures of the embedding provider. Only `Transient` is retried.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider temporarily unavailable: {0}")]
    Transient(String),

    #[error("embedding provider failed: {0}")]
    Fatal(String),

    #[error("embedding provider returned {found} vectors for {expected} inputs")]
    CountMismatch { expected: usize, found: usize },

    #[error("embedding dimension {found} does not match {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

impl EmbeddingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index {key} is corrupt: {details}")]
    Corrupt { key: String, details: String },

    #[error("index {key} is unavailable: {details}")]
    Unavailable { key: String, details: String },

    #[error("failed to embed document {document_id}: {source}")]
    Embedding {
        document_id: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("query vector dimension {found} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the language model. Only `Transient` is retried.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("language model temporarily unavailable: {0}")]
    Transient(String),

    #[error("language model call failed: {0}")]
    Fatal(String),

    #[error("language model returned no content")]
    EmptyContent,
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failure of a single question. Never aborts sibling questions.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] EmbeddingError),

    #[error("search failed: {0}")]
    Search(#[from] IndexError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Chunking(#[from] IngestError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
