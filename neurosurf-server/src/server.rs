use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    routing::{get, post},
};
use neurosurf_semantic::{
    Document, EmbeddingProvider, ExtractiveSummarizer, HashingEmbedder, JsonFileDocumentStore,
    RagResponse, SemanticService, Session, Summarizer,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    config::{Provider, ServerConfig},
    error::ApiError,
    protocol::{
        DeleteResponse, HealthResponse, IndexExtractedRequest, IndexRequest, IndexResponse,
        RagRequestBody,
    },
};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared handle passed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SemanticService>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(service: Arc<SemanticService>) -> Self {
        Self { service }
    }

    /// Build the service described by `config`, opening the durable
    /// document store and re-indexing its contents when a data directory is set.
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let (embedder, summarizer) = capabilities(config)?;
        let mut builder = SemanticService::builder()
            .config(config.semantic.clone())
            .embedding_provider(embedder)
            .summarizer(summarizer);

        if let Some(dir) = &config.data_dir {
            let store = JsonFileDocumentStore::open(dir.join("documents.json"))
                .await
                .with_context(|| format!("failed to open document store in {}", dir.display()))?;
            builder = builder.document_store(Arc::new(store));
        }

        let service = builder.build()?;
        let restored = service.rebuild_index().await.context("failed to rebuild vector index")?;
        if restored > 0 {
            info!(documents = restored, "restored documents from disk");
        }
        Ok(Self::new(Arc::new(service)))
    }
}

fn capabilities(
    config: &ServerConfig,
) -> anyhow::Result<(Arc<dyn EmbeddingProvider>, Arc<dyn Summarizer>)> {
    match config.provider {
        Provider::Local => Ok((
            Arc::new(HashingEmbedder::new(config.embedding_dimensions)),
            Arc::new(ExtractiveSummarizer),
        )),
        #[cfg(feature = "openai")]
        Provider::OpenAI => Ok((
            Arc::new(neurosurf_semantic::OpenAIEmbeddingProvider::from_env()?),
            Arc::new(neurosurf_semantic::OpenAISummarizer::from_env()?),
        )),
        #[cfg(not(feature = "openai"))]
        Provider::OpenAI => {
            anyhow::bail!("NEUROSURF_PROVIDER=openai requires the `openai` feature")
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/v1/semantic/index", post(index_documents))
        .route("/v1/semantic/extracted", post(index_extracted))
        .route("/v1/semantic/rag", post(rag))
        .route("/v1/semantic/documents/{id}", get(get_document).delete(delete_document))
        .route("/v1/semantic/sessions/{session_id}", get(get_session))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config).await?;
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for neurosurf-server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("neurosurf-server listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "neurosurf-server".to_string(),
        documents: state.service.document_count().await,
    })
}

/// POST /v1/semantic/index
async fn index_documents(
    State(state): State<AppState>,
    Json(request): Json<IndexRequest>,
) -> Result<Json<IndexResponse>, ApiError> {
    let documents: Vec<Document> = request.documents.into_iter().map(Document::from).collect();
    let report = state.service.index(documents).await?;
    Ok(Json(IndexResponse { status: "ok".to_string(), indexed: report.indexed }))
}

/// POST /v1/semantic/extracted
async fn index_extracted(
    State(state): State<AppState>,
    Json(request): Json<IndexExtractedRequest>,
) -> Result<Json<IndexResponse>, ApiError> {
    let report = state.service.index_extracted(request.pages).await?;
    Ok(Json(IndexResponse { status: "ok".to_string(), indexed: report.indexed }))
}

/// POST /v1/semantic/rag
async fn rag(
    State(state): State<AppState>,
    Json(body): Json<RagRequestBody>,
) -> Result<Json<RagResponse>, ApiError> {
    let request = body
        .into_request(state.service.config().default_k)
        .ok_or_else(|| ApiError::InvalidArgument("k must be at least 1".to_string()))?;
    Ok(Json(state.service.rag(request).await?))
}

/// GET /v1/semantic/documents/{id}
async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(state.service.get_document(&id).await?))
}

/// DELETE /v1/semantic/documents/{id}
async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = state.service.delete_document(&id).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// GET /v1/semantic/sessions/{session_id}
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Session> {
    Json(state.service.session(&session_id).await)
}
