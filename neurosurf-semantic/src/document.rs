//! Data types for documents, retrieval results, citations and responses.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SemanticError};

/// Metadata key whose value is surfaced on citations.
pub const URL_METADATA_KEY: &str = "url";

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Caller-assigned unique identifier.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Opaque key-value metadata, echoed back verbatim.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document without metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `url` metadata entry, if any.
    pub fn url(&self) -> Option<&str> {
        self.metadata.get(URL_METADATA_KEY).map(String::as_str)
    }

    /// Check that `id` and `text` are non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::Validation`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(SemanticError::Validation("document id must not be empty".to_string()));
        }
        if self.text.trim().is_empty() {
            return Err(SemanticError::Validation(format!(
                "document '{}' has empty text",
                self.id
            )));
        }
        Ok(())
    }
}

/// A retrieved [`Document`] paired with its relevance score in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredDocument {
    /// The retrieved document.
    pub document: Document,
    /// Relevance derived from cosine similarity (higher is more relevant).
    pub score: f32,
}

/// A document referenced by an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// The cited document ID.
    pub id: String,
    /// The retriever-reported relevance score in `[0, 1]`.
    pub score: f32,
    /// The document's `url` metadata, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<&ScoredDocument> for Citation {
    fn from(scored: &ScoredDocument) -> Self {
        Self {
            id: scored.document.id.clone(),
            score: scored.score,
            url: scored.document.url().map(str::to_string),
        }
    }
}

/// The answer to a RAG query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagResponse {
    /// Summary text for the first requested level.
    pub answer: String,
    /// Cited documents, ordered by descending score.
    pub citations: Vec<Citation>,
    /// Summary text for every requested level after the first.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub summaries: BTreeMap<String, String>,
}

/// A RAG query as accepted by [`SemanticService::rag`](crate::SemanticService::rag).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RagRequest {
    /// The natural-language question.
    pub query: String,
    /// The caller-supplied session identifier.
    pub session_id: String,
    /// Number of documents to retrieve.
    pub k: usize,
    /// Requested summary granularities, primary first.
    pub summary_levels: Vec<String>,
}

impl RagRequest {
    /// Create a request.
    pub fn new(
        query: impl Into<String>,
        session_id: impl Into<String>,
        k: usize,
        summary_levels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            k,
            summary_levels: summary_levels.into_iter().map(Into::into).collect(),
        }
    }
}

/// Acknowledgement for an index call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexReport {
    /// Number of documents committed.
    pub indexed: usize,
}
