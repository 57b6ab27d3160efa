//! Vector index trait for storing embeddings and running similarity search.

use async_trait::async_trait;

use crate::error::Result;

/// A document ID paired with its similarity to a query embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// The matching document ID.
    pub id: String,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// A k-nearest-neighbour index over document embeddings.
///
/// Every entry is keyed by a document ID; an ID has at most one entry.
///
/// # Example
///
/// ```rust,ignore
/// use neurosurf_semantic::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.insert("doc-1", embedding).await?;
/// let hits = index.search(&query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert an embedding for `id`, replacing any existing entry.
    async fn insert(&self, id: &str, embedding: Vec<f32>) -> Result<()>;

    /// Remove the entry for `id`. Returns whether an entry existed.
    async fn remove(&self, id: &str) -> Result<bool>;

    /// The stored embedding for `id`, if any.
    async fn embedding(&self, id: &str) -> Result<Option<Vec<f32>>>;

    /// Return up to `k` hits ordered by descending score.
    ///
    /// Ties are broken by insertion order, earliest first. An empty index
    /// yields an empty vector rather than an error.
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// Number of entries in the index.
    async fn len(&self) -> usize;

    /// Whether the index holds no entries.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Map a cosine similarity onto a relevance score in `[0, 1]`.
///
/// Orthogonal vectors score 0.5 and opposite vectors 0. The mapping is
/// monotonic, so ranking by relevance equals ranking by cosine.
pub fn cosine_to_relevance(cosine: f32) -> f32 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}
