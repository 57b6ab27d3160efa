//! Document storage.
//!
//! [`DocumentStore`] owns every ingested [`Document`]. Two implementations are
//! provided: [`InMemoryDocumentStore`] and [`JsonFileDocumentStore`], which
//! keeps the same map in memory and mirrors it to a JSON snapshot on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::Document;
use crate::error::{Result, SemanticError};

/// Keyed storage of documents.
///
/// Writers validate every document before mutating anything, so a failed
/// call leaves the store untouched.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a single document, overwriting any document with the same ID.
    async fn put(&self, document: Document) -> Result<()> {
        self.put_all(vec![document]).await
    }

    /// Store a batch of documents atomically with respect to readers.
    ///
    /// Either every document is stored or, on the first validation error,
    /// none are. A later duplicate ID within the batch wins.
    async fn put_all(&self, documents: Vec<Document>) -> Result<()>;

    /// Fetch a document by ID.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::NotFound`] if no document has this ID.
    async fn get(&self, id: &str) -> Result<Document>;

    /// Delete a document. Returns whether it existed.
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Every stored document, in no particular order.
    async fn all(&self) -> Result<Vec<Document>>;

    /// Number of stored documents.
    async fn len(&self) -> usize;
}

fn validate_batch(documents: &[Document]) -> Result<()> {
    documents.iter().try_for_each(Document::validate)
}

/// A document store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put_all(&self, documents: Vec<Document>) -> Result<()> {
        validate_batch(&documents)?;
        let mut store = self.documents.write().await;
        for document in documents {
            store.insert(document.id.clone(), document);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Document> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SemanticError::NotFound { id: id.to_string() })
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.documents.write().await.remove(id).is_some())
    }

    async fn all(&self) -> Result<Vec<Document>> {
        Ok(self.documents.read().await.values().cloned().collect())
    }

    async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

/// A document store persisted as a JSON snapshot file.
///
/// The snapshot is loaded once on [`open`](JsonFileDocumentStore::open) and
/// rewritten after every mutation through a temporary file and a rename, so
/// a crash mid-write leaves the previous snapshot intact. The write lock is
/// held until the snapshot is on disk; readers never observe a state that
/// has not been persisted.
#[derive(Debug)]
pub struct JsonFileDocumentStore {
    path: PathBuf,
    documents: RwLock<HashMap<String, Document>>,
}

impl JsonFileDocumentStore {
    /// Open (or create) the snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::Storage`] if the file exists but cannot be
    /// read or parsed, or its documents fail validation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let documents = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<Document> = serde_json::from_slice(&bytes).map_err(|e| {
                    SemanticError::Storage(format!("failed to parse {}: {e}", path.display()))
                })?;
                validate_batch(&list).map_err(|e| {
                    SemanticError::Storage(format!("invalid snapshot {}: {e}", path.display()))
                })?;
                list.into_iter().map(|d| (d.id.clone(), d)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(SemanticError::Storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        info!(path = %path.display(), documents = documents.len(), "opened document store");
        Ok(Self { path, documents: RwLock::new(documents) })
    }

    /// The snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, documents: &HashMap<String, Document>) -> Result<()> {
        let mut list: Vec<&Document> = documents.values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        let bytes = serde_json::to_vec_pretty(&list)
            .map_err(|e| SemanticError::Storage(format!("failed to serialize documents: {e}")))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SemanticError::Storage(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| SemanticError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            SemanticError::Storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), documents = list.len(), "persisted documents");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileDocumentStore {
    async fn put_all(&self, documents: Vec<Document>) -> Result<()> {
        validate_batch(&documents)?;
        let mut store = self.documents.write().await;
        let mut next = store.clone();
        for document in documents {
            next.insert(document.id.clone(), document);
        }
        self.persist(&next).await?;
        *store = next;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Document> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SemanticError::NotFound { id: id.to_string() })
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut store = self.documents.write().await;
        if !store.contains_key(id) {
            return Ok(false);
        }
        let mut next = store.clone();
        next.remove(id);
        self.persist(&next).await?;
        *store = next;
        Ok(true)
    }

    async fn all(&self) -> Result<Vec<Document>> {
        Ok(self.documents.read().await.values().cloned().collect())
    }

    async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_all_is_all_or_nothing() {
        let store = InMemoryDocumentStore::new();
        let batch = vec![Document::new("ok", "some text"), Document::new("bad", "   ")];
        assert!(matches!(store.put_all(batch).await, Err(SemanticError::Validation(_))));
        assert_eq!(store.len().await, 0);
        assert!(matches!(store.get("ok").await, Err(SemanticError::NotFound { .. })));
    }

    #[tokio::test]
    async fn put_overwrites_and_later_duplicates_win() {
        let store = InMemoryDocumentStore::new();
        store.put(Document::new("a", "first")).await.unwrap();
        store
            .put_all(vec![Document::new("a", "second"), Document::new("a", "third")])
            .await
            .unwrap();
        assert_eq!(store.get("a").await.unwrap().text, "third");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("documents.json");

        let store = JsonFileDocumentStore::open(&path).await.unwrap();
        store
            .put_all(vec![
                Document::new("paper-llm", "retrieval").with_metadata("url", "https://x"),
                Document::new("paper-eval", "evaluation"),
            ])
            .await
            .unwrap();
        assert!(store.remove("paper-eval").await.unwrap());
        drop(store);

        let reopened = JsonFileDocumentStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        let doc = reopened.get("paper-llm").await.unwrap();
        assert_eq!(doc.url(), Some("https://x"));
    }

    #[tokio::test]
    async fn json_store_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(matches!(
            JsonFileDocumentStore::open(&path).await,
            Err(SemanticError::Storage(_))
        ));
    }
}
