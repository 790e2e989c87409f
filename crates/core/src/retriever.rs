use crate::embeddings::Embedder;
use crate::error::AnswerError;
use crate::models::{RetrievalResult, VectorIndex};
use crate::store::search;
use tracing::debug;

/// Embeds `query` and returns the `k` closest chunks of `index`.
pub async fn retrieve(
    embedder: &dyn Embedder,
    index: &VectorIndex,
    query: &str,
    k: usize,
) -> Result<RetrievalResult, AnswerError> {
    let query_vector = embedder.embed_query(query).await?;
    let result = search(index, &query_vector, k)?;
    debug!(
        key = %index.key,
        requested = k,
        returned = result.len(),
        "retrieved chunks"
    );
    Ok(result)
}
