//! Per-document write locks.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// At most one writer per document ID. Writers to disjoint IDs never wait
/// on each other.
///
/// Entries are created on first use and dropped once no writer holds or
/// waits on them.
#[derive(Debug, Default)]
pub(crate) struct IdLocks {
    locks: LockMap,
}

impl IdLocks {
    /// Lock every ID in `ids`, in sorted order, so that overlapping batches
    /// cannot deadlock. Duplicate IDs are locked once.
    pub(crate) async fn acquire<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> IdLockGuard {
        let ids: BTreeSet<&str> = ids.into_iter().collect();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let lock = {
                let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
                locks.entry(id.to_string()).or_default().clone()
            };
            guards.push((id.to_string(), lock.lock_owned().await));
        }
        IdLockGuard { locks: self.locks.clone(), guards }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Holds the locks for a batch of IDs until dropped.
pub(crate) struct IdLockGuard {
    locks: LockMap,
    guards: Vec<(String, OwnedMutexGuard<()>)>,
}

impl Drop for IdLockGuard {
    fn drop(&mut self) {
        let ids: Vec<String> = self.guards.drain(..).map(|(id, _guard)| id).collect();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&id);
            }
        }
    }
}
