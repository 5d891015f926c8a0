//! Single-slot cache for the last successful job result.
//!
//! Holds at most one [`CachedResult`] at a time, keyed by the caller's
//! context id (e.g. the current page/document). The cache never expires
//! entries on its own; staleness is a caller-driven check. An optional
//! [`ResultStore`] mirrors the slot to a key-value store so the result
//! survives a host reload.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskbridge_core::types::Timestamp;

/// The last successful job's inputs and outputs for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResult {
    /// Task id the result came from.
    pub task_id: String,
    /// Context the result is valid under. Never offered for reuse under
    /// any other context.
    pub context_id: String,
    /// Fingerprint of the bindings that produced the result (see
    /// [`taskbridge_core::hashing`]).
    pub inputs_fingerprint: String,
    /// The verbatim output payload.
    pub outputs: serde_json::Value,
    /// When the result was cached (UTC).
    pub cached_at: Timestamp,
}

/// Persistence hook for cross-reload survival of the cached slot.
///
/// Implementations wrap whatever key-value store the host offers.
/// Operations are best-effort: implementations log their own failures
/// rather than surfacing them, matching the cache's advisory role.
pub trait ResultStore: Send + Sync {
    fn load(&self) -> Option<CachedResult>;
    fn save(&self, result: &CachedResult);
    fn clear(&self);
}

/// Single-slot, last-write-wins result cache.
///
/// The only writers are the facade (on success) and explicit caller
/// invalidation; hosts running the client from multiple threads must
/// serialize those externally. The internal mutex just keeps `&self`
/// methods sound.
pub struct ResultCache {
    slot: Mutex<Option<CachedResult>>,
    store: Option<Box<dyn ResultStore>>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache {
    /// An in-memory cache with no persistence.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            store: None,
        }
    }

    /// A cache backed by a persistence hook. The slot is seeded from
    /// `store.load()` so a previously cached result survives a reload.
    pub fn with_store(store: Box<dyn ResultStore>) -> Self {
        let initial = store.load();
        if let Some(cached) = &initial {
            tracing::debug!(
                task_id = %cached.task_id,
                context_id = %cached.context_id,
                "Restored cached result from store",
            );
        }
        Self {
            slot: Mutex::new(initial),
            store: Some(store),
        }
    }

    /// Overwrite the slot with a new result. Last write wins.
    pub fn store(&self, result: CachedResult) {
        if let Some(store) = &self.store {
            store.save(&result);
        }
        tracing::debug!(
            task_id = %result.task_id,
            context_id = %result.context_id,
            "Cached job result",
        );
        *self.slot.lock().unwrap() = Some(result);
    }

    /// Return the cached result only when its context matches.
    /// A stale-context slot is never silently reused.
    pub fn try_get(&self, context_id: &str) -> Option<CachedResult> {
        self.slot
            .lock()
            .unwrap()
            .as_ref()
            .filter(|cached| cached.context_id == context_id)
            .cloned()
    }

    /// Clear the slot when `context_id` is `None` or matches the cached
    /// context. A mismatched id is a no-op.
    pub fn invalidate(&self, context_id: Option<&str>) {
        let mut slot = self.slot.lock().unwrap();
        let matches = match (&*slot, context_id) {
            (Some(_), None) => true,
            (Some(cached), Some(id)) => cached.context_id == id,
            (None, _) => false,
        };
        if matches {
            *slot = None;
            if let Some(store) = &self.store {
                store.clear();
            }
            tracing::debug!("Invalidated cached result");
        }
    }

    /// Caller-driven staleness check: `true` when the slot is empty or
    /// older than `max_age`. The cache itself never expires entries.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        let slot = self.slot.lock().unwrap();
        match &*slot {
            None => true,
            Some(cached) => {
                let age = chrono::Utc::now() - cached.cached_at;
                age > chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX)
            }
        }
    }
}
