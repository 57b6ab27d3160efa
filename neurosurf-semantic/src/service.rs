//! The semantic service orchestrator.
//!
//! [`SemanticService`] owns the document store, vector index and session store
//! and composes them with an [`EmbeddingProvider`] and a [`Summarizer`] into
//! the two public operations: [`index`](SemanticService::index) and
//! [`rag`](SemanticService::rag).
//!
//! # Example
//!
//! ```rust,ignore
//! use neurosurf_semantic::{Document, HashingEmbedder, RagRequest, SemanticService};
//!
//! let service = SemanticService::builder()
//!     .embedding_provider(Arc::new(HashingEmbedder::default()))
//!     .build()?;
//!
//! service.index(vec![Document::new("doc-1", "Rust has no garbage collector.")]).await?;
//! let response = service.rag(RagRequest::new("garbage collection", "s1", 3, ["paragraph"])).await?;
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::config::SemanticConfig;
use crate::document::{Citation, Document, IndexReport, RagRequest, RagResponse};
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, SemanticError};
use crate::extract::ExtractedDocument;
use crate::inmemory::InMemoryVectorIndex;
use crate::locks::IdLocks;
use crate::retriever::Retriever;
use crate::session::{HistoryEntry, InMemorySessionStore, Session, SessionStore};
use crate::store::{DocumentStore, InMemoryDocumentStore};
use crate::summarizer::{ExtractiveSummarizer, Summarizer};
use crate::vector_index::VectorIndex;

/// Stages a `rag` request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    /// Arguments accepted, session loaded.
    Received,
    /// Waiting on the embedder.
    EmbeddingQuery,
    /// Searching the index and resolving documents.
    Retrieving,
    /// Waiting on the summarizer.
    Summarizing,
    /// Assembling the response and recording history.
    Responding,
    /// Terminal failure.
    Failed,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::EmbeddingQuery => "embedding_query",
            Self::Retrieving => "retrieving",
            Self::Summarizing => "summarizing",
            Self::Responding => "responding",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The semantic index and RAG query engine.
///
/// Construct one with [`SemanticService::builder()`] and share it behind an
/// `Arc`. Writes to the document store and vector index are serialized per
/// document ID, so the two never disagree about which version of a document
/// is live, while writes to different IDs proceed independently. External
/// capability calls never run under those locks.
pub struct SemanticService {
    config: SemanticConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    summarizer: Arc<dyn Summarizer>,
    document_store: Arc<dyn DocumentStore>,
    vector_index: Arc<dyn VectorIndex>,
    session_store: Arc<dyn SessionStore>,
    retriever: Retriever,
    write_locks: IdLocks,
}

impl fmt::Debug for SemanticService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticService").field("config", &self.config).finish_non_exhaustive()
    }
}

impl SemanticService {
    /// Create a new [`SemanticServiceBuilder`].
    pub fn builder() -> SemanticServiceBuilder {
        SemanticServiceBuilder::default()
    }

    /// Return a reference to the service configuration.
    pub fn config(&self) -> &SemanticConfig {
        &self.config
    }

    /// Return a reference to the document store.
    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.document_store
    }

    /// Return a reference to the vector index.
    pub fn vector_index(&self) -> &Arc<dyn VectorIndex> {
        &self.vector_index
    }

    /// Validate, embed and commit a batch of documents.
    ///
    /// The batch is all-or-nothing: if any document fails validation or
    /// embedding fails, nothing is stored. If the vector index rejects an
    /// embedding after the store has committed, both are restored to their
    /// state before the call.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::Validation`] for an empty batch or an invalid
    /// document, and propagates embedding and storage failures.
    pub async fn index(&self, documents: Vec<Document>) -> Result<IndexReport> {
        if documents.is_empty() {
            return Err(SemanticError::Validation("documents must not be empty".to_string()));
        }
        documents.iter().try_for_each(Document::validate)?;

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let embeddings = self
            .config
            .embedding
            .run("embedder", || self.embedding_provider.embed_batch(&texts))
            .await
            .inspect_err(|e| error!(error = %e, batch_size = texts.len(), "embedding failed during indexing"))?;
        if embeddings.len() != documents.len() {
            return Err(SemanticError::capability(
                "embedder",
                format!("returned {} embeddings for {} documents", embeddings.len(), documents.len()),
            ));
        }
        let dimensions = self.embedding_provider.dimensions();
        if let Some(bad) = embeddings.iter().position(|e| e.len() != dimensions) {
            return Err(SemanticError::capability(
                "embedder",
                format!(
                    "embedding for '{}' has {} dimensions, expected {dimensions}",
                    documents[bad].id,
                    embeddings[bad].len()
                ),
            ));
        }

        let entries: Vec<(String, Vec<f32>)> =
            documents.iter().map(|d| d.id.clone()).zip(embeddings).collect();
        let indexed = documents.len();

        let _locks = self.write_locks.acquire(documents.iter().map(|d| d.id.as_str())).await;
        let prior = {
            let mut prior = Vec::new();
            let mut seen = HashSet::new();
            for document in &documents {
                if seen.insert(document.id.as_str()) {
                    prior.push(self.prior_entry(&document.id).await?);
                }
            }
            prior
        };

        self.document_store.put_all(documents).await?;
        for (id, embedding) in entries {
            if let Err(e) = self.vector_index.insert(&id, embedding).await {
                error!(document.id = %id, error = %e, "index insert failed, rolling back batch");
                self.roll_back(prior).await;
                return Err(e);
            }
        }
        info!(indexed, "indexed documents");
        Ok(IndexReport { indexed })
    }

    /// Index pages produced by the HTML extraction filter.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::Validation`] if any page has no body text,
    /// otherwise behaves like [`index`](Self::index).
    pub async fn index_extracted(&self, pages: Vec<ExtractedDocument>) -> Result<IndexReport> {
        let documents = pages
            .into_iter()
            .map(ExtractedDocument::into_document)
            .collect::<Result<Vec<_>>>()?;
        self.index(documents).await
    }

    async fn prior_entry(&self, id: &str) -> Result<PriorEntry> {
        let document = match self.document_store.get(id).await {
            Ok(document) => Some(document),
            Err(SemanticError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        let embedding = self.vector_index.embedding(id).await?;
        Ok(PriorEntry { id: id.to_string(), document, embedding })
    }

    /// Undo a partially applied batch. Errors are logged; the caller reports
    /// the failure that triggered the rollback.
    async fn roll_back(&self, prior: Vec<PriorEntry>) {
        let mut restore = Vec::new();
        for entry in prior {
            let restored = match entry.embedding {
                Some(embedding) => self.vector_index.insert(&entry.id, embedding).await,
                None => self.vector_index.remove(&entry.id).await.map(|_| ()),
            };
            if let Err(e) = restored {
                error!(document.id = %entry.id, error = %e, "failed to restore index entry");
            }
            match entry.document {
                Some(document) => restore.push(document),
                None => {
                    if let Err(e) = self.document_store.remove(&entry.id).await {
                        error!(document.id = %entry.id, error = %e, "failed to remove uncommitted document");
                    }
                }
            }
        }
        if !restore.is_empty() {
            if let Err(e) = self.document_store.put_all(restore).await {
                error!(error = %e, "failed to restore previous documents");
            }
        }
    }

    /// Answer a query from the index and record it in the caller's session.
    ///
    /// The first entry of `summary_levels` becomes [`RagResponse::answer`];
    /// the remaining levels are returned in [`RagResponse::summaries`].
    ///
    /// # Errors
    ///
    /// - [`SemanticError::InvalidArgument`] if `k < 1`, `summary_levels` is
    ///   empty, or `query`/`session_id` is blank.
    /// - [`SemanticError::EmptyIndex`] if nothing has been indexed.
    /// - [`SemanticError::NoResults`] if retrieval yields no documents.
    /// - Embedding or summarization failures once retries are exhausted.
    pub async fn rag(&self, request: RagRequest) -> Result<RagResponse> {
        let span = info_span!(
            "rag",
            request.id = %Uuid::new_v4(),
            session.id = %request.session_id,
            k = request.k
        );
        let mut stage = RequestStage::Received;
        let result = self.run_rag(request, &mut stage).instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| {
                error!(%stage, error = %e, "rag request failed");
                advance(&mut stage, RequestStage::Failed);
            });
        }
        result
    }

    async fn run_rag(&self, request: RagRequest, stage: &mut RequestStage) -> Result<RagResponse> {
        validate_request(&request)?;
        let k = request.k.min(self.config.max_k);
        let session = self.session_store.load(&request.session_id).await;
        debug!(%stage, history_len = session.history.len(), "request received");

        advance(stage, RequestStage::EmbeddingQuery);
        // The retriever embeds and searches in one call; Retrieving is entered
        // once it returns.
        let retrieved = self.retriever.retrieve(&request.query, k).await?;
        advance(stage, RequestStage::Retrieving);
        if retrieved.is_empty() {
            return Err(if self.vector_index.is_empty().await {
                SemanticError::EmptyIndex
            } else {
                SemanticError::NoResults
            });
        }

        advance(stage, RequestStage::Summarizing);
        let mut summaries = self
            .config
            .summarizer
            .run("summarizer", || {
                self.summarizer.summarize(&request.query, &retrieved, &request.summary_levels)
            })
            .await?;

        advance(stage, RequestStage::Responding);
        let mut levels = request.summary_levels.iter();
        let primary = levels.next().map(String::as_str).unwrap_or_default();
        let answer = take_level(&mut summaries, primary)?;
        let mut extra = BTreeMap::new();
        for level in levels {
            if extra.contains_key(level) || level == primary {
                continue;
            }
            let text = take_level(&mut summaries, level)?;
            extra.insert(level.clone(), text);
        }

        let citations: Vec<Citation> = retrieved.iter().map(Citation::from).collect();
        let cited_ids = citations.iter().map(|c| c.id.clone()).collect();
        self.session_store
            .append(&request.session_id, HistoryEntry::new(&request.query, &answer, cited_ids))
            .await;

        info!(citation_count = citations.len(), "rag request completed");
        Ok(RagResponse { answer, citations, summaries: extra })
    }

    /// Fetch a stored document.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::NotFound`] if the ID is unknown.
    pub async fn get_document(&self, id: &str) -> Result<Document> {
        self.document_store.get(id).await
    }

    /// Delete a document and its index entry. Returns whether it existed.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let _locks = self.write_locks.acquire([id]).await;
        let removed = self.document_store.remove(id).await?;
        self.vector_index.remove(id).await?;
        if removed {
            info!(document.id = %id, "deleted document");
        }
        Ok(removed)
    }

    /// Load a session's history. Unknown IDs yield an empty session.
    pub async fn session(&self, session_id: &str) -> Session {
        self.session_store.load(session_id).await
    }

    /// Number of stored documents.
    pub async fn document_count(&self) -> usize {
        self.document_store.len().await
    }

    /// Re-embed every stored document into the vector index.
    ///
    /// Used at start-up when the document store is durable but the index is
    /// not. Returns the number of documents indexed.
    pub async fn rebuild_index(&self) -> Result<usize> {
        let documents = self.document_store.all().await?;
        if documents.is_empty() {
            return Ok(0);
        }
        let report = self.index(documents).await?;
        info!(indexed = report.indexed, "rebuilt vector index from document store");
        Ok(report.indexed)
    }
}

/// Store and index state of one ID before a batch commit.
struct PriorEntry {
    id: String,
    document: Option<Document>,
    embedding: Option<Vec<f32>>,
}

fn advance(stage: &mut RequestStage, next: RequestStage) {
    debug!(from = %stage, to = %next, "stage transition");
    *stage = next;
}

fn validate_request(request: &RagRequest) -> Result<()> {
    if request.k < 1 {
        return Err(SemanticError::InvalidArgument("k must be at least 1".to_string()));
    }
    if request.summary_levels.is_empty() {
        return Err(SemanticError::InvalidArgument("summaryLevels must not be empty".to_string()));
    }
    if request.summary_levels.iter().any(|l| l.trim().is_empty()) {
        return Err(SemanticError::InvalidArgument("summary levels must not be blank".to_string()));
    }
    if request.query.trim().is_empty() {
        return Err(SemanticError::InvalidArgument("query must not be empty".to_string()));
    }
    if request.session_id.trim().is_empty() {
        return Err(SemanticError::InvalidArgument("sessionId must not be empty".to_string()));
    }
    Ok(())
}

fn take_level(summaries: &mut HashMap<String, String>, level: &str) -> Result<String> {
    summaries.remove(level).ok_or_else(|| {
        SemanticError::capability("summarizer", format!("no text returned for level '{level}'"))
    })
}

/// Builder for constructing a [`SemanticService`].
///
/// Only the embedding provider is required. The remaining components default
/// to [`ExtractiveSummarizer`], [`InMemoryDocumentStore`],
/// [`InMemoryVectorIndex`] and [`InMemorySessionStore`].
///
/// # Example
///
/// ```rust,ignore
/// let service = SemanticService::builder()
///     .config(SemanticConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .summarizer(Arc::new(summarizer))          // optional
///     .document_store(Arc::new(store))           // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct SemanticServiceBuilder {
    config: Option<SemanticConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    document_store: Option<Arc<dyn DocumentStore>>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    session_store: Option<Arc<dyn SessionStore>>,
}

impl SemanticServiceBuilder {
    /// Set the service configuration.
    pub fn config(mut self, config: SemanticConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the summarizer.
    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Set the document store.
    pub fn document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.document_store = Some(store);
        self
    }

    /// Set the vector index.
    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.vector_index = Some(index);
        self
    }

    /// Set the session store.
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Build the [`SemanticService`].
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::Config`] if no embedding provider was set.
    pub fn build(self) -> Result<SemanticService> {
        let config = self.config.unwrap_or_default();
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| SemanticError::Config("embedding_provider is required".to_string()))?;
        let summarizer = self.summarizer.unwrap_or_else(|| Arc::new(ExtractiveSummarizer));
        let document_store =
            self.document_store.unwrap_or_else(|| Arc::new(InMemoryDocumentStore::new()));
        let vector_index = self.vector_index.unwrap_or_else(|| Arc::new(InMemoryVectorIndex::new()));
        let session_store =
            self.session_store.unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));

        let retriever = Retriever::new(
            embedding_provider.clone(),
            vector_index.clone(),
            document_store.clone(),
            config.embedding,
            config.similarity_threshold,
        );

        Ok(SemanticService {
            config,
            embedding_provider,
            summarizer,
            document_store,
            vector_index,
            session_store,
            retriever,
            write_locks: IdLocks::default(),
        })
    }
}
