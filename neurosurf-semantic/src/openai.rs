//! OpenAI-backed embedding provider and summarizer.
//!
//! This module is only available when the `openai` feature is enabled. Both
//! types call the REST API directly with `reqwest` and also work against
//! OpenAI-compatible servers via [`with_base_url`](OpenAIEmbeddingProvider::with_base_url).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::document::ScoredDocument;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, SemanticError};
use crate::summarizer::{LEVEL_BULLET, LEVEL_SENTENCE, Summarizer};

/// The default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model used for summaries.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

fn api_key_from_env(capability: &str) -> Result<String> {
    std::env::var("OPENAI_API_KEY").map_err(|_| {
        SemanticError::capability(capability, "OPENAI_API_KEY environment variable not set")
    })
}

fn check_api_key(capability: &str, api_key: &str) -> Result<()> {
    if api_key.is_empty() {
        return Err(SemanticError::capability(capability, "API key must not be empty"));
    }
    Ok(())
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Send a JSON POST and decode the response, classifying failures.
///
/// Transport errors, 429 and 5xx responses are retryable; everything else is
/// permanent.
async fn post_json<Req: Serialize + ?Sized, Resp: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    capability: &str,
    url: &str,
    api_key: &str,
    body: &Req,
) -> Result<Resp> {
    let response = client.post(url).bearer_auth(api_key).json(body).send().await.map_err(|e| {
        error!(capability, error = %e, "request failed");
        SemanticError::transient(capability, format!("request failed: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
        error!(capability, %status, "API error");
        let message = format!("API returned {status}: {detail}");
        return Err(if status.as_u16() == 429 || status.is_server_error() {
            SemanticError::transient(capability, message)
        } else {
            SemanticError::capability(capability, message)
        });
    }

    response.json().await.map_err(|e| {
        error!(capability, error = %e, "failed to parse response");
        SemanticError::capability(capability, format!("failed to parse response: {e}"))
    })
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        check_api_key("embedder", &api_key)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env("embedder")?)
    }

    /// Point the provider at an OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "OpenAI", text_len = text.len(), "embedding single text");
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| SemanticError::capability("embedder", "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "OpenAI", batch_size = texts.len(), model = %self.model, "embedding batch");

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };
        let mut response: EmbeddingResponse = post_json(
            &self.client,
            "embedder",
            &format!("{}/embeddings", self.base_url),
            &self.api_key,
            &request,
        )
        .await?;

        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`Summarizer`] backed by the OpenAI chat completions API.
///
/// Issues one completion per requested level.
pub struct OpenAISummarizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAISummarizer {
    /// Create a new summarizer with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        check_api_key("summarizer", &api_key)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_CHAT_MODEL.into(),
        })
    }

    /// Create a new summarizer using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env("summarizer")?)
    }

    /// Point the summarizer at an OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the chat model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

fn level_instruction(level: &str) -> String {
    match level {
        LEVEL_SENTENCE => "Answer in exactly one sentence.".to_string(),
        LEVEL_BULLET => "Answer as a short bulleted list, one bullet per key point.".to_string(),
        other => format!("Answer as a single {other}."),
    }
}

fn build_context(query: &str, documents: &[ScoredDocument]) -> String {
    let mut context = String::new();
    for (i, doc) in documents.iter().enumerate() {
        context.push_str(&format!("[{}] (id: {}) {}\n", i + 1, doc.document.id, doc.document.text));
    }
    context.push_str(&format!("\nQuestion: {query}"));
    context
}

#[async_trait]
impl Summarizer for OpenAISummarizer {
    async fn summarize(
        &self,
        query: &str,
        documents: &[ScoredDocument],
        levels: &[String],
    ) -> Result<HashMap<String, String>> {
        let context = build_context(query, documents);
        let url = format!("{}/chat/completions", self.base_url);
        let mut out = HashMap::with_capacity(levels.len());

        for level in levels {
            if out.contains_key(level) {
                continue;
            }
            debug!(provider = "OpenAI", model = %self.model, level = %level, "summarizing");
            let request = ChatRequest {
                model: &self.model,
                temperature: 0.0,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: format!(
                            "You answer questions using only the numbered documents provided. \
                             Cite documents by their id in square brackets. {}",
                            level_instruction(level)
                        ),
                    },
                    ChatMessage { role: "user", content: context.clone() },
                ],
            };
            let response: ChatResponse =
                post_json(&self.client, "summarizer", &url, &self.api_key, &request).await?;
            let text = response
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| SemanticError::capability("summarizer", "API returned no choices"))?;
            out.insert(level.clone(), text.trim().to_string());
        }
        Ok(out)
    }
}
