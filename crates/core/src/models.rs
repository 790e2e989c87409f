use crate::ingest::{digest_text, normalize_document_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source text plus the caller-supplied identifier it is cached under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: String,
    text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Identifies the document by a digest of its text.
    pub fn from_content(text: impl Into<String>) -> Self {
        let text = text.into();
        let digest = digest_text(&text);
        Self {
            id: format!("doc-{}", &digest[..16]),
            text,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn storage_key(&self) -> String {
        normalize_document_id(&self.id)
    }

    pub fn digest(&self) -> String {
        digest_text(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Searchable chunk vectors for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    pub key: String,
    pub document_id: String,
    pub model_id: String,
    pub dimensions: usize,
    pub source_digest: String,
    pub built_at: DateTime<Utc>,
    pub entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Chunk texts separated by blank lines, in rank order.
    pub fn joined_text(&self) -> String {
        self.hits
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: RetrievalResult,
}

/// Parsed match score. `reliable` is false when the model gave no number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReading {
    pub value: u8,
    pub reliable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_documents_have_stable_ids() {
        let first = Document::from_content("Jane Doe, Rust engineer");
        let second = Document::from_content("Jane Doe, Rust engineer");
        assert_eq!(first.id(), second.id());
        assert!(first.id().starts_with("doc-"));
        assert_eq!(first.storage_key(), first.id());
    }

    #[test]
    fn storage_key_is_normalized() {
        let document = Document::new("Jane Doe (2024).pdf", "text");
        assert_eq!(document.storage_key(), "Jane_Doe__2024_");
    }

    #[test]
    fn joined_text_keeps_rank_order() {
        let result = RetrievalResult {
            hits: vec![
                ScoredChunk {
                    chunk: Chunk {
                        index: 2,
                        text: "second".to_string(),
                    },
                    score: 0.9,
                },
                ScoredChunk {
                    chunk: Chunk {
                        index: 0,
                        text: "first".to_string(),
                    },
                    score: 0.5,
                },
            ],
        };
        assert_eq!(result.joined_text(), "second\n\nfirst");
    }
}
