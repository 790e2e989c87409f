//! On-disk cache of per-document vector indices.
//!
//! Each document key owns a pair of files in the store directory:
//! `index_<key>.vec` holds the raw vectors and `index_<key>.json` holds the
//! metadata and chunk texts. The metadata file is written last and acts as the
//! commit marker, so a half-written pair is detected and rebuilt.

use crate::chunking::{split_text, ChunkingConfig};
use crate::config::RagConfig;
use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, IndexError, IngestError};
use crate::ingest::{digest_bytes, normalize_document_id};
use crate::models::{Chunk, Document, IndexedChunk, RetrievalResult, ScoredChunk, VectorIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

const FORMAT_VERSION: u32 = 1;
const VECTOR_MAGIC: &[u8; 4] = b"RFIV";
const HEADER_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct IndexMetadata {
    format_version: u32,
    key: String,
    document_id: String,
    model_id: String,
    dimensions: usize,
    chunk_count: usize,
    source_digest: String,
    vector_digest: String,
    built_at: DateTime<Utc>,
    chunks: Vec<Chunk>,
}

pub struct IndexStore {
    root: PathBuf,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    build_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>, embedder: Arc<dyn Embedder>, config: &RagConfig) -> Self {
        Self {
            root: root.into(),
            embedder,
            chunking: config.chunking,
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn vector_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("index_{key}.vec"))
    }

    pub fn metadata_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("index_{key}.json"))
    }

    /// Loads the cached index for `document`, or builds and persists it.
    ///
    /// The embedder is only called on a miss. A cached index built from other
    /// text or by another embedding model is discarded and rebuilt, as is one
    /// that fails to load. Concurrent calls for the same key wait for the
    /// first build instead of starting their own.
    pub async fn get_or_build(&self, document: &Document) -> Result<VectorIndex, IndexError> {
        let key = document.storage_key();
        let lock = self.build_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.load_or_build(document, &key).await
        };
        drop(lock);
        self.release_build_lock(&key);
        result
    }

    async fn load_or_build(&self, document: &Document, key: &str) -> Result<VectorIndex, IndexError> {
        let source_digest = document.digest();
        match self.load(key).await {
            Ok(Some(index))
                if index.model_id == self.embedder.model_id()
                    && index.source_digest == source_digest =>
            {
                info!(key = %key, chunks = index.len(), "loaded cached index");
                return Ok(index);
            }
            Ok(Some(index)) => {
                info!(
                    key = %key,
                    cached_model = %index.model_id,
                    model = %self.embedder.model_id(),
                    "cached index is stale, rebuilding"
                );
                self.discard(key).await?;
            }
            Ok(None) => info!(key = %key, "no cached index, building"),
            Err(IndexError::Corrupt { details, .. }) => {
                warn!(key = %key, %details, "cached index is corrupt, rebuilding");
                self.discard(key).await?;
            }
            Err(error) => return Err(error),
        }

        let index = self.build(document, key.to_string(), source_digest).await?;
        self.persist(&index).await?;
        info!(key = %index.key, chunks = index.len(), dimensions = index.dimensions, "index built");
        Ok(index)
    }

    /// Loads an index when the source text is not at hand. Missing or corrupt
    /// indices, and those built by another embedding model, cannot be rebuilt
    /// here and are reported as unavailable.
    pub async fn open(&self, document_id: &str) -> Result<VectorIndex, IndexError> {
        let key = normalize_document_id(document_id);
        match self.load(&key).await {
            Ok(Some(index)) if index.model_id != self.embedder.model_id() => {
                Err(IndexError::Unavailable {
                    details: format!(
                        "built with model {}, current model {}",
                        index.model_id,
                        self.embedder.model_id()
                    ),
                    key,
                })
            }
            Ok(Some(index)) => Ok(index),
            Ok(None) => Err(IndexError::Unavailable {
                key,
                details: "no persisted index and no source text to build one".to_string(),
            }),
            Err(IndexError::Corrupt { key, details }) => Err(IndexError::Unavailable {
                key,
                details: format!("persisted index is corrupt: {details}"),
            }),
            Err(error) => Err(error),
        }
    }

    /// Reads a persisted index. `Ok(None)` when neither file exists.
    pub async fn load(&self, key: &str) -> Result<Option<VectorIndex>, IndexError> {
        let metadata_path = self.metadata_path(key);
        let vector_path = self.vector_path(key);

        let has_metadata = fs::try_exists(&metadata_path).await?;
        let has_vectors = fs::try_exists(&vector_path).await?;
        match (has_metadata, has_vectors) {
            (false, false) => return Ok(None),
            (true, true) => {}
            (true, false) => return Err(corrupt(key, "vector file is missing")),
            (false, true) => return Err(corrupt(key, "metadata file is missing")),
        }

        let metadata_bytes = fs::read(&metadata_path)
            .await
            .map_err(|error| corrupt(key, format!("unreadable metadata: {error}")))?;
        let metadata: IndexMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|error| corrupt(key, format!("unparseable metadata: {error}")))?;
        let vector_bytes = fs::read(&vector_path)
            .await
            .map_err(|error| corrupt(key, format!("unreadable vectors: {error}")))?;

        decode_index(key, metadata, &vector_bytes).map(Some)
    }

    pub async fn persist(&self, index: &VectorIndex) -> Result<(), IndexError> {
        fs::create_dir_all(&self.root).await?;

        let vector_bytes = encode_vectors(index);
        let metadata = IndexMetadata {
            format_version: FORMAT_VERSION,
            key: index.key.clone(),
            document_id: index.document_id.clone(),
            model_id: index.model_id.clone(),
            dimensions: index.dimensions,
            chunk_count: index.len(),
            source_digest: index.source_digest.clone(),
            vector_digest: digest_bytes(&vector_bytes),
            built_at: index.built_at,
            chunks: index.chunks().cloned().collect(),
        };
        let metadata_bytes = serde_json::to_vec_pretty(&metadata)?;

        write_replacing(&self.vector_path(&index.key), &vector_bytes).await?;
        write_replacing(&self.metadata_path(&index.key), &metadata_bytes).await?;
        Ok(())
    }

    /// Removes both files of an index. Missing files are fine.
    pub async fn discard(&self, key: &str) -> Result<(), IndexError> {
        for path in [self.metadata_path(key), self.vector_path(key)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }

    async fn build(
        &self,
        document: &Document,
        key: String,
        source_digest: String,
    ) -> Result<VectorIndex, IndexError> {
        let chunks = split_text(document.text(), self.chunking);
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument(document.id().to_string()).into());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embedding_failure = |source: EmbeddingError| IndexError::Embedding {
            document_id: document.id().to_string(),
            source,
        };

        let vectors = self.embedder.embed(&texts).await.map_err(embedding_failure)?;
        if vectors.len() != chunks.len() {
            return Err(embedding_failure(EmbeddingError::CountMismatch {
                expected: chunks.len(),
                found: vectors.len(),
            }));
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or_default();
        if let Some(odd) = vectors.iter().find(|vector| vector.len() != dimensions || vector.is_empty()) {
            return Err(embedding_failure(EmbeddingError::DimensionMismatch {
                expected: dimensions,
                found: odd.len(),
            }));
        }

        Ok(VectorIndex {
            key,
            document_id: document.id().to_string(),
            model_id: self.embedder.model_id().to_string(),
            dimensions,
            source_digest,
            built_at: Utc::now(),
            entries: chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexedChunk { chunk, vector })
                .collect(),
        })
    }

    fn build_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .build_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Drops the guard for `key` once no other caller holds or awaits it.
    fn release_build_lock(&self, key: &str) {
        let mut locks = self
            .build_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_build_locks(&self) -> usize {
        self.build_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Top-`k` chunks by cosine similarity, best first, ties in chunk order.
/// `k` larger than the index is clamped.
pub fn search(
    index: &VectorIndex,
    query_vector: &[f32],
    k: usize,
) -> Result<RetrievalResult, IndexError> {
    if !index.is_empty() && query_vector.len() != index.dimensions {
        return Err(IndexError::DimensionMismatch {
            expected: index.dimensions,
            found: query_vector.len(),
        });
    }

    let mut hits: Vec<ScoredChunk> = index
        .entries
        .iter()
        .map(|entry| ScoredChunk {
            chunk: entry.chunk.clone(),
            score: cosine_similarity(query_vector, &entry.vector),
        })
        .collect();

    hits.sort_by(|left, right| {
        right
            .score
            .total_cmp(&left.score)
            .then_with(|| left.chunk.index.cmp(&right.chunk.index))
    });
    hits.truncate(k.min(index.len()));

    Ok(RetrievalResult { hits })
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

fn encode_vectors(index: &VectorIndex) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + index.len() * index.dimensions * 4);
    bytes.extend_from_slice(VECTOR_MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(index.dimensions as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u32).to_le_bytes());
    for entry in &index.entries {
        bytes.extend(entry.vector.iter().flat_map(|value| value.to_le_bytes()));
    }
    bytes
}

fn decode_index(
    key: &str,
    metadata: IndexMetadata,
    vector_bytes: &[u8],
) -> Result<VectorIndex, IndexError> {
    if metadata.format_version != FORMAT_VERSION {
        return Err(corrupt(
            key,
            format!("unsupported format version {}", metadata.format_version),
        ));
    }
    if metadata.key != key {
        return Err(corrupt(key, format!("metadata belongs to {}", metadata.key)));
    }
    if digest_bytes(vector_bytes) != metadata.vector_digest {
        return Err(corrupt(key, "vector file checksum mismatch"));
    }
    if vector_bytes.len() < HEADER_LEN || &vector_bytes[..4] != VECTOR_MAGIC {
        return Err(corrupt(key, "vector file header is invalid"));
    }

    let header_field = |offset: usize| {
        u32::from_le_bytes([
            vector_bytes[offset],
            vector_bytes[offset + 1],
            vector_bytes[offset + 2],
            vector_bytes[offset + 3],
        ]) as usize
    };
    let dimensions = header_field(8);
    let count = header_field(12);

    if dimensions != metadata.dimensions
        || count != metadata.chunk_count
        || count != metadata.chunks.len()
    {
        return Err(corrupt(
            key,
            format!(
                "shape mismatch: header {count}x{dimensions}, metadata {}x{} with {} chunks",
                metadata.chunk_count,
                metadata.dimensions,
                metadata.chunks.len()
            ),
        ));
    }
    if vector_bytes.len() != HEADER_LEN + count * dimensions * 4 {
        return Err(corrupt(key, "vector file length does not match its header"));
    }
    if metadata
        .chunks
        .iter()
        .enumerate()
        .any(|(position, chunk)| chunk.index != position)
    {
        return Err(corrupt(key, "chunks are out of order"));
    }

    let values: Vec<f32> = vector_bytes[HEADER_LEN..]
        .chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect();
    let entries = metadata
        .chunks
        .into_iter()
        .zip(values.chunks_exact(dimensions.max(1)))
        .map(|(chunk, vector)| IndexedChunk {
            chunk,
            vector: vector.to_vec(),
        })
        .collect::<Vec<_>>();

    if entries.len() != count {
        return Err(corrupt(key, "vector data is truncated"));
    }

    Ok(VectorIndex {
        key: metadata.key,
        document_id: metadata.document_id,
        model_id: metadata.model_id,
        dimensions,
        source_digest: metadata.source_digest,
        built_at: metadata.built_at,
        entries,
    })
}

async fn write_replacing(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    fs::write(&staging, bytes).await?;
    if let Err(error) = fs::rename(&staging, path).await {
        let _ = fs::remove_file(&staging).await;
        return Err(error.into());
    }
    Ok(())
}

fn corrupt(key: &str, details: impl Into<String>) -> IndexError {
    IndexError::Corrupt {
        key: key.to_string(),
        details: details.into(),
    }
}
