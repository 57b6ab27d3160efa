//! Query-time retrieval: embed → search → resolve.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::capability::CapabilityPolicy;
use crate::document::ScoredDocument;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, SemanticError};
use crate::store::DocumentStore;
use crate::vector_index::{VectorIndex, cosine_to_relevance};

/// Resolves a natural-language query into ranked documents.
///
/// IDs returned by the index that no longer resolve in the document store are
/// skipped with a warning; retrieval continues with the remaining hits.
///
/// The similarity threshold applies to raw cosine similarity. Reported scores
/// are relevance values in `[0, 1]` (see [`cosine_to_relevance`]).
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    policy: CapabilityPolicy,
    similarity_threshold: f32,
}

impl Retriever {
    /// Create a retriever over the given components.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
        policy: CapabilityPolicy,
        similarity_threshold: f32,
    ) -> Self {
        Self { embedder, index, store, policy, similarity_threshold }
    }

    /// Return at most `k` documents for `query`, ordered by descending score.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::InvalidArgument`] if `k == 0`, and propagates
    /// embedding and index failures.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Err(SemanticError::InvalidArgument("k must be at least 1".to_string()));
        }

        let embedding = self.policy.run("embedder", || self.embedder.embed(query)).await?;
        let hits = self.index.search(&embedding, k).await?;
        debug!(hit_count = hits.len(), k, "vector search completed");

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            if hit.score < self.similarity_threshold {
                continue;
            }
            match self.store.get(&hit.id).await {
                Ok(document) => results
                    .push(ScoredDocument { document, score: cosine_to_relevance(hit.score) }),
                Err(SemanticError::NotFound { id }) => {
                    warn!(document.id = %id, "index entry has no stored document, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }
}
