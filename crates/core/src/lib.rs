pub mod chunking;
pub mod composer;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod retriever;
pub mod retry;
pub mod score;
pub mod store;

#[cfg(test)]
mod test_support;

pub use chunking::{split_text, ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use composer::{AnswerComposer, BatchReport, QuestionOutcome};
pub use config::{Credential, EmbeddingSettings, GenerationSettings, RagConfig, DEFAULT_TOP_K};
pub use embeddings::{CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{AnswerError, ConfigError, EmbeddingError, GenerationError, IndexError, IngestError};
pub use extractor::{extract_pdf_text, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{digest_text, load_resume, normalize_document_id};
pub use llm::{CompletionRequest, LanguageModel, OpenAiChatModel};
pub use models::{Answer, Chunk, Document, IndexedChunk, RetrievalResult, ScoreReading, ScoredChunk, VectorIndex};
pub use prompts::{available_prompt_sets, prompt_set, PromptSet, DEFAULT_PROMPT_SET, SCORE_QUESTION_KEY};
pub use retriever::retrieve;
pub use retry::{with_retry, RetryError, RetryPolicy, Retryable};
pub use score::{extract_score, parse_score, read_score};
pub use store::{search, IndexStore};
