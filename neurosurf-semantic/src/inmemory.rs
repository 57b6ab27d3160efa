//! In-memory vector index using exact cosine similarity.
//!
//! This module provides [`InMemoryVectorIndex`], a linear-scan index backed by
//! a `HashMap` protected by a `tokio::sync::RwLock`. Recall is exact; search
//! cost grows linearly with the number of entries.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, SemanticError};
use crate::vector_index::{IndexHit, VectorIndex, cosine_similarity};

#[derive(Debug, Clone)]
struct IndexEntry {
    seq: u64,
    embedding: Vec<f32>,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<String, IndexEntry>,
    next_seq: u64,
    dimensions: Option<usize>,
}

/// An in-memory vector index using cosine similarity for search.
///
/// Each entry records the sequence number of its first insertion. Replacing
/// an entry keeps that number, so re-indexing a document never changes how
/// its ties are ordered.
///
/// # Example
///
/// ```rust,ignore
/// use neurosurf_semantic::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.insert("doc-1", vec![1.0, 0.0]).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    /// Create a new empty in-memory vector index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn insert(&self, id: &str, embedding: Vec<f32>) -> Result<()> {
        let mut state = self.state.write().await;
        match state.dimensions {
            Some(dimensions) if dimensions != embedding.len() && !state.entries.is_empty() => {
                return Err(SemanticError::VectorIndex {
                    backend: "InMemory".to_string(),
                    message: format!(
                        "embedding for '{id}' has {} dimensions, index expects {dimensions}",
                        embedding.len()
                    ),
                });
            }
            _ => state.dimensions = Some(embedding.len()),
        }

        let seq = match state.entries.get(id) {
            Some(existing) => existing.seq,
            None => {
                state.next_seq += 1;
                state.next_seq
            }
        };
        state.entries.insert(id.to_string(), IndexEntry { seq, embedding });
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.entries.remove(id).is_some())
    }

    async fn embedding(&self, id: &str) -> Result<Option<Vec<f32>>> {
        Ok(self.state.read().await.entries.get(id).map(|entry| entry.embedding.clone()))
    }

    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let state = self.state.read().await;
        if let Some(dimensions) = state.dimensions {
            if !state.entries.is_empty() && dimensions != embedding.len() {
                return Err(SemanticError::VectorIndex {
                    backend: "InMemory".to_string(),
                    message: format!(
                        "query has {} dimensions, index expects {dimensions}",
                        embedding.len()
                    ),
                });
            }
        }

        let mut scored: Vec<(u64, IndexHit)> = state
            .entries
            .iter()
            .map(|(id, entry)| {
                let score = cosine_similarity(&entry.embedding, embedding);
                (entry.seq, IndexHit { id: id.clone(), score })
            })
            .collect();

        scored.sort_by(|(seq_a, a), (seq_b, b)| {
            b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then(seq_a.cmp(seq_b))
        });
        scored.truncate(k);
        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }
}
