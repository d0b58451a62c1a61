//! At most one outstanding network call per key.
//!
//! A dispatched call runs as its own tokio task so it completes even if
//! every caller awaiting it goes away. Callers hold a [`PendingFetch`],
//! a cloneable shared handle that resolves to the same result for all of
//! them. The key leaves the table when the task finishes, whatever the
//! outcome.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use libre_core::CacheKey;
use serde_json::Value;
use tracing::{trace, warn};

/// Shared handle to an in-flight call.
pub type PendingFetch = Shared<BoxFuture<'static, Option<Value>>>;

#[derive(Clone, Default)]
pub struct InFlightTable {
    pending: Arc<Mutex<HashMap<CacheKey, PendingFetch>>>,
}

impl fmt::Debug for InFlightTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<CacheKey> = self.lock().keys().cloned().collect();
        f.debug_struct("InFlightTable").field("keys", &keys).finish()
    }
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `key` if a call is outstanding.
    pub fn get(&self, key: &str) -> Option<PendingFetch> {
        self.lock().get(key).cloned()
    }

    /// Start `call` for `key`, or join the call already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch<F>(&self, key: CacheKey, call: F) -> PendingFetch
    where
        F: Future<Output = Option<Value>> + Send + 'static,
    {
        let mut pending = self.lock();
        if let Some(existing) = pending.get(key.as_str()) {
            return existing.clone();
        }

        let table = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            // Armed on first poll, which never happens inside `spawn`.
            let _settle = SettleGuard {
                table,
                key: task_key,
            };
            call.await
        });

        let task_key = key.clone();
        let handle = async move {
            match task.await {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %task_key, error = %e, "In-flight request task failed");
                    None
                }
            }
        }
        .boxed()
        .shared();

        pending.insert(key, handle.clone());
        handle
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, PendingFetch>> {
        // Nothing panics while holding this lock; recover if a caller did.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes the key once the dispatched task ends, including on panic or abort.
struct SettleGuard {
    table: InFlightTable,
    key: CacheKey,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.table.lock().remove(self.key.as_str());
        trace!(key = %self.key, "In-flight request settled");
    }
}
