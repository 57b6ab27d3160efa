//! Semantic document index and retrieval-augmented generation engine.
//!
//! This crate provides:
//! - [`DocumentStore`] implementations (in-memory and JSON snapshot)
//! - [`VectorIndex`] with exact cosine search ([`InMemoryVectorIndex`])
//! - [`Retriever`] resolving queries into ranked documents
//! - [`SessionStore`] for per-session query history
//! - [`Summarizer`] and [`EmbeddingProvider`] capability traits, with
//!   deterministic built-in implementations
//! - [`SemanticService`], the orchestrator behind the `index` and `rag` calls
//!
//! Enable the `openai` feature for OpenAI-backed embedding and summarization.

pub mod capability;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod inmemory;
mod locks;
#[cfg(feature = "openai")]
pub mod openai;
pub mod retriever;
pub mod service;
pub mod session;
pub mod store;
pub mod summarizer;
pub mod vector_index;

pub use capability::CapabilityPolicy;
pub use config::{SemanticConfig, SemanticConfigBuilder};
pub use document::{Citation, Document, IndexReport, RagRequest, RagResponse, ScoredDocument};
pub use embedding::{EmbeddingProvider, HashingEmbedder};
pub use error::{Result, SemanticError};
pub use extract::{ExtractedDocument, ExtractedPage};
pub use inmemory::InMemoryVectorIndex;
#[cfg(feature = "openai")]
pub use openai::{OpenAIEmbeddingProvider, OpenAISummarizer};
pub use retriever::Retriever;
pub use service::{RequestStage, SemanticService, SemanticServiceBuilder};
pub use session::{HistoryEntry, InMemorySessionStore, Session, SessionStore};
pub use store::{DocumentStore, InMemoryDocumentStore, JsonFileDocumentStore};
pub use summarizer::{ExtractiveSummarizer, Summarizer};
pub use vector_index::{IndexHit, VectorIndex, cosine_similarity, cosine_to_relevance};
