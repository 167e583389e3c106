//! Query-side retrieval over a shared [`VectorIndex`].

use std::sync::Arc;

use tracing::debug;

use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::SharedIndex;

/// Retrieves the chunks most similar to a natural-language query.
///
/// The query is embedded with the same provider used at ingestion time;
/// mismatched embedding spaces are a caller configuration error and are
/// not detected here.
pub struct Retriever {
    index: SharedIndex,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    /// Create a retriever over the given index and embedding provider.
    pub fn new(index: SharedIndex, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, embedder }
    }

    /// Retrieve up to `k` results ordered by decreasing relevance.
    ///
    /// Returns an empty sequence, not an error, when the index is empty.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if self.index.read().await.is_empty() {
            debug!(query, "retrieval against empty index");
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let hits = self.index.read().await.search(&query_embedding, k)?;

        debug!(query, result_count = hits.len(), "retrieved chunks");
        Ok(hits
            .into_iter()
            .map(|(chunk, score)| RetrievalResult { chunk, score, query: query.to_string() })
            .collect())
    }
}
