// src/cache.rs
//! Process-wide content cache keyed by source identity, not literal URL.
//!
//! Bounded twice: an LRU cap on entry count and a TTL checked on read.
//! Concurrent misses on the same key are collapsed into a single fetch.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use metrics::counter;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;
pub const DEFAULT_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub cache_key: String,
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

fn squash(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn identity(s: &str) -> String {
    let s = s.trim().to_lowercase();
    s.strip_prefix("www.").map(str::to_string).unwrap_or(s)
}

/// Raw material reused across vehicles (e.g. a channel's video list).
pub fn source_key(source: &str) -> String {
    format!("src:{}", identity(source))
}

/// Result for one vehicle from one source.
pub fn vehicle_key(source: &str, make: &str, model: &str) -> String {
    format!("{}:{}:{}", identity(source), squash(make), squash(model))
}

/// Short stable id for logs; URLs themselves are not logged.
pub fn short_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Article URL discovered by search for this outlet and vehicle.
pub fn article_url_key(domain: &str, make: &str, model: &str) -> String {
    format!("url:{}", vehicle_key(domain, make, model))
}

pub struct ContentCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ContentCache {
    pub fn new(max_entries: usize, ttl_days: i64) -> Self {
        Self::with_ttl(max_entries, Duration::days(ttl_days.max(1)))
    }

    /// Sub-day lifetimes, e.g. channel listings that go stale in hours.
    pub fn with_ttl(max_entries: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            ttl: ttl.max(Duration::minutes(1)),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let mut map = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = map.peek(key).map(|e| now - e.fetched_at > self.ttl);
        let fresh = match expired {
            Some(false) => map.get(key).map(|e| e.content.clone()),
            Some(true) => {
                map.pop(key);
                None
            }
            None => None,
        };
        if fresh.is_some() {
            counter!("resolver_cache_hits_total").increment(1);
        } else {
            counter!("resolver_cache_misses_total").increment(1);
        }
        fresh
    }

    pub fn put(&self, key: &str, content: impl Into<String>) {
        self.put_at(key, content, Utc::now());
    }

    pub fn put_at(&self, key: &str, content: impl Into<String>, now: DateTime<Utc>) {
        let mut map = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        map.put(
            key.to_string(),
            CacheEntry {
                cache_key: key.to_string(),
                content: content.into(),
                fetched_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `(content, was_cached)`. Concurrent callers for the same key
    /// wait for the first fetch instead of issuing their own.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<(String, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok((hit, true));
        }
        let gate = {
            let mut map = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(key.to_string()).or_default().clone()
        };
        let _inflight = InflightSlot {
            map: &self.inflight,
            key,
        };
        let _guard = gate.lock().await;
        if let Some(hit) = self.get(key) {
            return Ok((hit, true));
        }
        let out = fetch().await;
        if let Ok(content) = &out {
            self.put(key, content.clone());
        }
        out.map(|c| (c, false))
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Drops the single-flight gate for `key` however the fetch ends,
/// including cancellation of the awaiting future.
struct InflightSlot<'a> {
    map: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    key: &'a str,
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key);
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL_DAYS)
    }
}
