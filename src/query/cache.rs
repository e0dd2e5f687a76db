use crate::query::weekly::WeeklyMatrix;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Thread-safe cache of computed heatmaps with TTL-based expiration.
#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

struct CacheEntry {
    matrix: WeeklyMatrix,
    inserted_at: Instant,
}

impl QueryCache {
    /// Create a new cache with the given TTL in seconds.
    /// A TTL of 0 disables caching (all lookups miss).
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Look up a heatmap by key. Returns `None` if missing or expired.
    pub fn get(&self, key: &str) -> Option<WeeklyMatrix> {
        if self.ttl.is_zero() {
            return None;
        }
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() <= self.ttl)
            .map(|entry| entry.matrix)
    }

    pub fn insert(&self, key: String, matrix: WeeklyMatrix) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.lock().insert(
            key,
            CacheEntry {
                matrix,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove expired entries. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}
