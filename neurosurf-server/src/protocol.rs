//! JSON bodies of the `/v1/semantic` API.

use std::collections::HashMap;

use neurosurf_semantic::{Document, ExtractedDocument, RagRequest};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct IndexRequest {
    pub documents: Vec<DocumentBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentBody {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<DocumentBody> for Document {
    fn from(body: DocumentBody) -> Self {
        Document { id: body.id, text: body.text, metadata: body.metadata }
    }
}

/// Pages produced by the HTML extraction filter, each with an `id` and optional `url`.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexExtractedRequest {
    pub pages: Vec<ExtractedDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResponse {
    pub status: String,
    pub indexed: usize,
}

/// `k` is signed on the wire so that negative values reach validation
/// instead of failing deserialization. It may be omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRequestBody {
    pub query: String,
    pub session_id: String,
    #[serde(default)]
    pub k: Option<i64>,
    pub summary_levels: Vec<String>,
}

impl RagRequestBody {
    /// Convert into the engine's request, using `default_k` when `k` is
    /// absent; `None` when `k` is negative.
    pub fn into_request(self, default_k: usize) -> Option<RagRequest> {
        let k = match self.k {
            Some(k) => usize::try_from(k).ok()?,
            None => default_k,
        };
        Some(RagRequest {
            query: self.query,
            session_id: self.session_id,
            k,
            summary_levels: self.summary_levels,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub documents: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
