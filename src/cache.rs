//! In-memory TTL+LRU result cache. Thread-safe; records hit/miss metrics.
//!
//! Cache locking follows a single coarse `RwLock` over the whole map:
//! every operation is short, synchronous, and contains no await point, so a
//! std (non-async) lock never blocks the executor.

use crate::metrics::MetricsSink;
use crate::rule::PreFetchResult;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Estimated token savings credited per cached result on a hit.
const TOKENS_PER_RESULT: u64 = 100;

/// One cache entry, owned by the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub project_path: String,
    pub results: Vec<PreFetchResult>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
}

pub struct ResultCache {
    state: RwLock<CacheState>,
    ttl: Duration,
    max_entries: usize,
    metrics: Arc<dyn MetricsSink>,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
            }),
            ttl,
            max_entries,
            metrics,
        }
    }

    /// Create a fresh entry, replacing any existing one for the same key in
    /// place (no eviction triggered on replace). Evicts the
    /// least-recently-accessed entry first if inserting a new key would
    /// exceed `max_entries`.
    pub fn set(&self, project_path: &str, results: Vec<PreFetchResult>) {
        let now = Utc::now();
        let expires_at = now + ChronoDuration::from_std(self.ttl).unwrap_or(ChronoDuration::zero());

        let mut state = self.state.write().unwrap();

        if !state.entries.contains_key(project_path) && state.entries.len() >= self.max_entries {
            if let Some(victim) = state
                .entries
                .values()
                .min_by_key(|e| e.last_accessed)
                .map(|e| e.project_path.clone())
            {
                state.entries.remove(&victim);
            }
        }

        state.entries.insert(
            project_path.to_string(),
            CacheEntry {
                project_path: project_path.to_string(),
                results,
                created_at: now,
                expires_at,
                last_accessed: now,
            },
        );

        self.metrics.set_cache_size(state.entries.len());
    }

    /// Look up an entry. Expired entries are removed on observation.
    pub fn get(&self, project_path: &str) -> Option<CacheEntry> {
        {
            let state = self.state.read().unwrap();
            match state.entries.get(project_path) {
                None => {
                    drop(state);
                    self.metrics.inc_cache_miss();
                    return None;
                }
                Some(entry) => {
                    if Utc::now() <= entry.expires_at {
                        // Hit path requires a write lock to bump
                        // last_accessed; fall through after releasing the
                        // read guard.
                    } else {
                        drop(state);
                        self.expire(project_path);
                        self.metrics.inc_cache_miss();
                        return None;
                    }
                }
            }
        }

        let mut state = self.state.write().unwrap();
        let now = Utc::now();
        match state.entries.get_mut(project_path) {
            Some(entry) if now <= entry.expires_at => {
                entry.last_accessed = now;
                let entry = entry.clone();
                let size = state.entries.len();
                drop(state);
                self.metrics.inc_cache_hit();
                self.metrics.add_tokens_saved(entry.results.len() as u64 * TOKENS_PER_RESULT);
                self.metrics.set_cache_size(size);
                Some(entry)
            }
            Some(_) => {
                state.entries.remove(project_path);
                let size = state.entries.len();
                drop(state);
                self.metrics.inc_cache_miss();
                self.metrics.set_cache_size(size);
                None
            }
            None => {
                drop(state);
                self.metrics.inc_cache_miss();
                None
            }
        }
    }

    fn expire(&self, project_path: &str) {
        let mut state = self.state.write().unwrap();
        state.entries.remove(project_path);
        self.metrics.set_cache_size(state.entries.len());
    }

    pub fn delete(&self, project_path: &str) {
        let mut state = self.state.write().unwrap();
        state.entries.remove(project_path);
        self.metrics.set_cache_size(state.entries.len());
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap();
        state.entries.clear();
        self.metrics.set_cache_size(0);
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
