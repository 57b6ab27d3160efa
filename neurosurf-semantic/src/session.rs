//! Per-session query history.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

/// One answered query inside a [`Session`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// The query as submitted.
    pub query: String,
    /// The primary answer returned to the caller.
    pub answer: String,
    /// IDs of the cited documents, in citation order.
    pub cited_ids: Vec<String>,
    /// When the answer was produced.
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Create an entry stamped with the current time.
    pub fn new(query: impl Into<String>, answer: impl Into<String>, cited_ids: Vec<String>) -> Self {
        Self { query: query.into(), answer: answer.into(), cited_ids, timestamp: Utc::now() }
    }
}

/// A caller-scoped conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The caller-supplied session ID.
    pub session_id: String,
    /// Answered queries, oldest first.
    pub history: Vec<HistoryEntry>,
}

impl Session {
    /// An empty session: the initial state of every session ID.
    pub fn empty(session_id: impl Into<String>) -> Self {
        Self { session_id: session_id.into(), history: Vec::new() }
    }
}

/// Storage for session histories.
///
/// Appends to a single session are serialized; different sessions are
/// independent. Sessions are never deleted here.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append an entry, creating the session if it does not exist.
    async fn append(&self, session_id: &str, entry: HistoryEntry);

    /// Load a session. Unknown IDs yield an empty session.
    async fn load(&self, session_id: &str) -> Session;
}

/// An in-memory [`SessionStore`] with one mutex per session.
#[derive(Debug, Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Session>>>>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn session_handle(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return handle.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::empty(session_id))))
            .clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, session_id: &str, entry: HistoryEntry) {
        let handle = self.session_handle(session_id).await;
        handle.lock().await.history.push(entry);
    }

    async fn load(&self, session_id: &str) -> Session {
        let handle = self.sessions.read().await.get(session_id).cloned();
        match handle {
            Some(handle) => handle.lock().await.clone(),
            None => Session::empty(session_id),
        }
    }
}
