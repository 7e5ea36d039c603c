//! Last-good snapshot cache.
//!
//! Holds the most recent successful upstream snapshot per key. The
//! orchestrator only reads it when a fresh fetch fails, and only accepts
//! entries younger than its staleness limit.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct CacheEntry<T> {
    value: Arc<T>,
    inserted_at: DateTime<Utc>,
}

/// Keyed cache of shared snapshots, safe to use across tasks.
pub struct SnapshotCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T> Default for SnapshotCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SnapshotCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The cached value for `key` if it is no older than `max_stale`,
    /// along with its age.
    pub async fn get_fresh(&self, key: &str, max_stale: Duration) -> Option<(Arc<T>, Duration)> {
        self.get_fresh_at(key, max_stale, Utc::now()).await
    }

    async fn get_fresh_at(
        &self,
        key: &str,
        max_stale: Duration,
        now: DateTime<Utc>,
    ) -> Option<(Arc<T>, Duration)> {
        let entries = self.entries.read().await;
        entries.get(key).and_then(|entry| {
            let age = now - entry.inserted_at;
            if age <= max_stale {
                Some((Arc::clone(&entry.value), age))
            } else {
                None
            }
        })
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub async fn insert(&self, key: impl Into<String>, value: Arc<T>) {
        self.insert_at(key.into(), value, Utc::now()).await;
    }

    async fn insert_at(&self, key: String, value: Arc<T>, at: DateTime<Utc>) {
        self.entries.write().await.insert(
            key,
            CacheEntry {
                value,
                inserted_at: at,
            },
        );
    }

    /// Drop entries older than `max_age`. Returns how many were removed.
    pub async fn evict_older_than(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now - entry.inserted_at <= max_age);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "Evicted stale snapshots");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
