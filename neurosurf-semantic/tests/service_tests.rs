//! End-to-end behaviour of `SemanticService::index` and `SemanticService::rag`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use neurosurf_semantic::{
    CapabilityPolicy, Document, DocumentStore, EmbeddingProvider, ExtractedDocument, ExtractedPage,
    HashingEmbedder, IndexHit, InMemoryDocumentStore, InMemoryVectorIndex, JsonFileDocumentStore,
    RagRequest, ScoredDocument, SemanticConfig, SemanticError, SemanticService, Summarizer,
    VectorIndex,
};
use tokio::sync::Notify;

fn academic_documents() -> Vec<Document> {
    vec![
        Document::new(
            "paper-llm",
            "This paper explores retrieval augmented language models for domain adaptation.",
        )
        .with_metadata("url", "https://papers.example.com/rag"),
        Document::new(
            "paper-eval",
            "We propose evaluation metrics for agent coordination in multi-step tasks.",
        )
        .with_metadata("url", "https://papers.example.com/eval"),
    ]
}

fn service() -> SemanticService {
    SemanticService::builder()
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .build()
        .unwrap()
}

fn fast_policy() -> CapabilityPolicy {
    CapabilityPolicy {
        timeout: Duration::from_millis(100),
        max_retries: 2,
        initial_backoff: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn relevant_paper_ranks_first_with_url_citations() {
    let service = service();
    let report = service.index(academic_documents()).await.unwrap();
    assert_eq!(report.indexed, 2);

    let response = service
        .rag(RagRequest::new("retrieval augmented language models", "academic", 2, ["paragraph"]))
        .await
        .unwrap();

    let ids: Vec<_> = response.citations.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["paper-llm", "paper-eval"]);
    assert!(response.citations[0].score > response.citations[1].score);
    assert_eq!(response.citations[0].url.as_deref(), Some("https://papers.example.com/rag"));
    assert!(response.answer.contains("[paper-llm]"));
    assert!(response.summaries.is_empty());
}

#[tokio::test]
async fn indexing_is_idempotent() {
    let service = service();
    service.index(academic_documents()).await.unwrap();
    let request = RagRequest::new("agent coordination metrics", "s", 5, ["sentence"]);
    let before = service.rag(request.clone()).await.unwrap();

    service.index(academic_documents()).await.unwrap();
    assert_eq!(service.vector_index().len().await, 2);
    assert_eq!(service.document_count().await, 2);

    let after = service.rag(request).await.unwrap();
    assert_eq!(before.citations, after.citations);
    assert_eq!(before.answer, after.answer);
}

#[tokio::test]
async fn empty_index_is_reported_not_crashed() {
    let service = service();
    let result = service.rag(RagRequest::new("anything", "s", 5, ["paragraph"])).await;
    assert!(matches!(result, Err(SemanticError::EmptyIndex)));
    assert!(service.session("s").await.history.is_empty());
}

#[tokio::test]
async fn threshold_filtering_everything_is_no_results() {
    let config = SemanticConfig::builder().similarity_threshold(0.99).build().unwrap();
    let service = SemanticService::builder()
        .config(config)
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .build()
        .unwrap();
    service.index(academic_documents()).await.unwrap();

    let result = service.rag(RagRequest::new("unrelated cooking recipes", "s", 2, ["bullet"])).await;
    assert!(matches!(result, Err(SemanticError::NoResults)));
}

#[tokio::test]
async fn first_level_is_answer_and_rest_are_summaries() {
    let service = service();
    service.index(academic_documents()).await.unwrap();

    let response = service
        .rag(RagRequest::new("language models", "s", 1, ["sentence", "bullet", "sentence"]))
        .await
        .unwrap();
    assert_eq!(
        response.answer,
        "This paper explores retrieval augmented language models for domain adaptation."
    );
    assert_eq!(response.summaries.len(), 1);
    assert!(response.summaries["bullet"].starts_with("- "));
}

#[tokio::test]
async fn session_history_grows_once_per_call_in_order() {
    let service = service();
    service.index(academic_documents()).await.unwrap();

    for query in ["first question", "second question", "third question"] {
        service.rag(RagRequest::new(query, "academic", 1, ["paragraph"])).await.unwrap();
    }
    service.rag(RagRequest::new("elsewhere", "other", 1, ["paragraph"])).await.unwrap();

    let session = service.session("academic").await;
    let queries: Vec<_> = session.history.iter().map(|e| e.query.as_str()).collect();
    assert_eq!(queries, ["first question", "second question", "third question"]);
    assert_eq!(session.history[0].cited_ids.len(), 1);
    assert!(session.history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn invalid_document_rejects_whole_batch() {
    let service = service();
    let mut batch = academic_documents();
    batch.push(Document::new("blank", "   "));

    assert!(matches!(service.index(batch).await, Err(SemanticError::Validation(_))));
    assert_eq!(service.document_count().await, 0);
    assert!(service.vector_index().is_empty().await);
}

#[tokio::test]
async fn concurrent_writes_to_one_id_leave_store_and_index_consistent() {
    let embedder = Arc::new(HashingEmbedder::default());
    let service = Arc::new(
        SemanticService::builder().embedding_provider(embedder.clone()).build().unwrap(),
    );
    let texts = ["alpha beta gamma delta", "omega psi chi phi"];

    let tasks: Vec<_> = texts
        .iter()
        .map(|text| {
            let service = service.clone();
            let doc = Document::new("shared", *text);
            tokio::spawn(async move { service.index(vec![doc]).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = service.get_document("shared").await.unwrap();
    assert!(texts.contains(&stored.text.as_str()));
    assert_eq!(service.vector_index().len().await, 1);

    let expected = embedder.embed(&stored.text).await.unwrap();
    let hits = service.vector_index().search(&expected, 1).await.unwrap();
    assert_eq!(hits[0].id, "shared");
    assert!((hits[0].score - 1.0).abs() < 1e-5, "index holds a stale embedding");
}

/// Fails with a transient error for the first `failures` calls.
struct FlakyEmbedder {
    inner: HashingEmbedder,
    calls: AtomicU32,
    failures: u32,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> neurosurf_semantic::Result<Vec<f32>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(SemanticError::transient("embedder", "temporarily unavailable"));
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[tokio::test]
async fn transient_embedder_failures_are_retried() {
    let embedder =
        Arc::new(FlakyEmbedder { inner: HashingEmbedder::new(32), calls: AtomicU32::new(0), failures: 2 });
    let config = SemanticConfig::builder().embedding_policy(fast_policy()).build().unwrap();
    let service =
        SemanticService::builder().config(config).embedding_provider(embedder.clone()).build().unwrap();

    service.index(academic_documents()).await.unwrap();
    assert_eq!(service.document_count().await, 2);
}

#[tokio::test]
async fn exhausted_retries_leave_store_untouched() {
    let embedder = Arc::new(FlakyEmbedder {
        inner: HashingEmbedder::new(32),
        calls: AtomicU32::new(0),
        failures: u32::MAX,
    });
    let config = SemanticConfig::builder().embedding_policy(fast_policy()).build().unwrap();
    let service =
        SemanticService::builder().config(config).embedding_provider(embedder.clone()).build().unwrap();

    let result = service.index(academic_documents()).await;
    assert!(matches!(result, Err(SemanticError::ExternalCapability { retryable: true, .. })));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    assert_eq!(service.document_count().await, 0);
}

struct SlowSummarizer;

#[async_trait]
impl Summarizer for SlowSummarizer {
    async fn summarize(
        &self,
        _query: &str,
        _documents: &[ScoredDocument],
        _levels: &[String],
    ) -> neurosurf_semantic::Result<HashMap<String, String>> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(HashMap::new())
    }
}

#[tokio::test]
async fn summarizer_timeout_surfaces_and_skips_history() {
    let policy = CapabilityPolicy { max_retries: 0, ..fast_policy() };
    let config = SemanticConfig::builder().summarizer_policy(policy).build().unwrap();
    let service = SemanticService::builder()
        .config(config)
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .summarizer(Arc::new(SlowSummarizer))
        .build()
        .unwrap();
    service.index(academic_documents()).await.unwrap();

    let result = service.rag(RagRequest::new("language models", "s", 2, ["paragraph"])).await;
    assert!(matches!(result, Err(SemanticError::Timeout { .. })));
    assert!(service.session("s").await.history.is_empty());
}

struct ForgetfulSummarizer;

#[async_trait]
impl Summarizer for ForgetfulSummarizer {
    async fn summarize(
        &self,
        _query: &str,
        _documents: &[ScoredDocument],
        _levels: &[String],
    ) -> neurosurf_semantic::Result<HashMap<String, String>> {
        Ok(HashMap::from([("paragraph".to_string(), "text".to_string())]))
    }
}

#[tokio::test]
async fn missing_summary_level_is_a_capability_error() {
    let service = SemanticService::builder()
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .summarizer(Arc::new(ForgetfulSummarizer))
        .build()
        .unwrap();
    service.index(academic_documents()).await.unwrap();

    let result = service.rag(RagRequest::new("models", "s", 2, ["paragraph", "bullet"])).await;
    assert!(matches!(result, Err(SemanticError::ExternalCapability { .. })));
}

#[tokio::test]
async fn durable_store_rebuilds_index_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("documents.json");

    let first = SemanticService::builder()
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .document_store(Arc::new(JsonFileDocumentStore::open(&path).await.unwrap()))
        .build()
        .unwrap();
    first.index(academic_documents()).await.unwrap();
    drop(first);

    let second = SemanticService::builder()
        .embedding_provider(Arc::new(HashingEmbedder::default()))
        .document_store(Arc::new(JsonFileDocumentStore::open(&path).await.unwrap()))
        .build()
        .unwrap();
    assert_eq!(second.rebuild_index().await.unwrap(), 2);

    let response = second
        .rag(RagRequest::new("retrieval augmented language models", "s", 1, ["sentence"]))
        .await
        .unwrap();
    assert_eq!(response.citations[0].id, "paper-llm");
}

#[tokio::test]
async fn citation_scores_stay_in_unit_interval_for_unrelated_documents() {
    let service = service();
    let documents: Vec<_> = (0..40)
        .map(|i| Document::new(format!("noise-{i}"), format!("zq{i} xv{i} wk{i} harbor{i} quilt{i}")))
        .collect();
    service.index(documents).await.unwrap();

    let response = service
        .rag(RagRequest::new("retrieval augmented language models", "s", 40, ["sentence"]))
        .await
        .unwrap();
    assert_eq!(response.citations.len(), 40);
    for citation in &response.citations {
        assert!((0.0..=1.0).contains(&citation.score), "{}: {}", citation.id, citation.score);
    }
    assert!(response.citations.windows(2).all(|w| w[0].score >= w[1].score));
}

/// Holds any batch containing "slow" until a batch containing "fast" lands.
struct GatedStore {
    inner: InMemoryDocumentStore,
    fast_written: Notify,
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn put_all(&self, documents: Vec<Document>) -> neurosurf_semantic::Result<()> {
        let is_fast = documents.iter().any(|d| d.id == "fast");
        if documents.iter().any(|d| d.id == "slow") {
            self.fast_written.notified().await;
        }
        self.inner.put_all(documents).await?;
        if is_fast {
            self.fast_written.notify_one();
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> neurosurf_semantic::Result<Document> {
        self.inner.get(id).await
    }

    async fn remove(&self, id: &str) -> neurosurf_semantic::Result<bool> {
        self.inner.remove(id).await
    }

    async fn all(&self) -> neurosurf_semantic::Result<Vec<Document>> {
        self.inner.all().await
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[tokio::test]
async fn writes_to_different_ids_proceed_independently() {
    let store = Arc::new(GatedStore { inner: InMemoryDocumentStore::new(), fast_written: Notify::new() });
    let service = Arc::new(
        SemanticService::builder()
            .embedding_provider(Arc::new(HashingEmbedder::default()))
            .document_store(store)
            .build()
            .unwrap(),
    );

    let slow = {
        let service = service.clone();
        tokio::spawn(async move { service.index(vec![Document::new("slow", "slow writer text")]).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        service.index(vec![Document::new("fast", "fast writer text")]).await.unwrap();
        slow.await.unwrap().unwrap();
    })
    .await;
    assert!(outcome.is_ok(), "a write to one id waited on a writer of another id");
    assert_eq!(service.document_count().await, 2);
    assert_eq!(service.vector_index().len().await, 2);
}

/// Rejects inserts for one ID and delegates everything else.
struct RejectingIndex {
    inner: InMemoryVectorIndex,
    reject: &'static str,
}

#[async_trait]
impl VectorIndex for RejectingIndex {
    async fn insert(&self, id: &str, embedding: Vec<f32>) -> neurosurf_semantic::Result<()> {
        if id == self.reject {
            return Err(SemanticError::VectorIndex {
                backend: "rejecting".to_string(),
                message: format!("refused '{id}'"),
            });
        }
        self.inner.insert(id, embedding).await
    }

    async fn remove(&self, id: &str) -> neurosurf_semantic::Result<bool> {
        self.inner.remove(id).await
    }

    async fn embedding(&self, id: &str) -> neurosurf_semantic::Result<Option<Vec<f32>>> {
        self.inner.embedding(id).await
    }

    async fn search(&self, embedding: &[f32], k: usize) -> neurosurf_semantic::Result<Vec<IndexHit>> {
        self.inner.search(embedding, k).await
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[tokio::test]
async fn failed_index_insert_rolls_back_store_and_index() {
    let embedder = Arc::new(HashingEmbedder::default());
    let index = Arc::new(RejectingIndex { inner: InMemoryVectorIndex::new(), reject: "poison" });
    let service = SemanticService::builder()
        .embedding_provider(embedder.clone())
        .vector_index(index.clone())
        .build()
        .unwrap();
    service.index(vec![Document::new("keep", "original keep text")]).await.unwrap();

    let result = service
        .index(vec![
            Document::new("keep", "replacement keep text"),
            Document::new("fresh", "fresh document text"),
            Document::new("poison", "poison document text"),
        ])
        .await;
    assert!(matches!(result, Err(SemanticError::VectorIndex { .. })));

    assert_eq!(service.get_document("keep").await.unwrap().text, "original keep text");
    for id in ["fresh", "poison"] {
        assert!(matches!(service.get_document(id).await, Err(SemanticError::NotFound { .. })));
    }
    assert_eq!(service.document_count().await, 1);
    assert_eq!(index.len().await, 1);
    assert_eq!(
        index.embedding("keep").await.unwrap(),
        Some(embedder.embed("original keep text").await.unwrap())
    );
}

#[tokio::test]
async fn extracted_pages_are_indexed_with_their_metadata() {
    let service = service();
    let page = ExtractedPage::from_json(
        r#"{"title":"RAG survey","text":"Retrieval augmented generation grounds answers in documents."}"#,
    )
    .unwrap();
    let report = service
        .index_extracted(vec![ExtractedDocument {
            id: "survey".to_string(),
            url: Some("https://papers.example.com/survey".to_string()),
            page,
        }])
        .await
        .unwrap();
    assert_eq!(report.indexed, 1);

    let stored = service.get_document("survey").await.unwrap();
    assert_eq!(stored.metadata.get("title").map(String::as_str), Some("RAG survey"));
    assert_eq!(stored.url(), Some("https://papers.example.com/survey"));

    let empty = ExtractedDocument { id: "blank".to_string(), url: None, page: ExtractedPage::default() };
    assert!(matches!(service.index_extracted(vec![empty]).await, Err(SemanticError::Validation(_))));
    assert_eq!(service.document_count().await, 1);
}
