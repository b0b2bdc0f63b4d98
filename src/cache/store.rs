//! TTL key/value store.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::observability::metrics;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Hit/miss counters and size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// A thread-safe cache of JSON values with per-key expiry.
///
/// Cloning is cheap; clones share the same storage.
#[derive(Clone, Default)]
pub struct Cache {
    inner: Arc<DashMap<String, Entry>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous one.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        self.inner.insert(key.into(), Entry::new(value, ttl));
    }

    pub fn set_json<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl);
        Ok(())
    }

    /// Fetch a live value. Expired entries are removed and count as misses.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let found = match self.inner.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match found {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.inner.remove_if(key, |_, e| e.is_expired(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                self.inner.remove(key);
                None
            }
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner.get(key).is_some_and(|e| !e.is_expired(now))
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    /// Delete every key matching a glob pattern (`*` wildcards).
    pub fn delete_pattern(&self, pattern: &str) -> usize {
        let before = self.inner.len();
        self.inner.retain(|key, _| !glob_match(pattern, key));
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            tracing::debug!(pattern = %pattern, removed, "Deleted cache keys by pattern");
        }
        removed
    }

    /// Live keys matching a glob pattern.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        self.inner
            .iter()
            .filter(|r| !r.value().is_expired(now) && glob_match(pattern, r.key()))
            .map(|r| r.key().clone())
            .collect()
    }

    /// Atomically add `by` to an integer counter.
    ///
    /// A missing or expired key starts from zero and receives `ttl_on_create`;
    /// an existing key keeps its expiry.
    pub fn increment(&self, key: &str, by: i64, ttl_on_create: Option<Duration>) -> i64 {
        let now = Instant::now();
        match self.inner.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = Entry::new(Value::from(by), ttl_on_create);
                    by
                } else {
                    let next = entry.value.as_i64().unwrap_or(0) + by;
                    entry.value = Value::from(next);
                    next
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(Value::from(by), ttl_on_create));
                by
            }
        }
    }

    /// Reset the expiry of a live key.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.inner.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            _ => false,
        }
    }

    /// Remaining lifetime; `None` when missing or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entry = self.inner.get(key)?;
        let at = entry.expires_at?;
        at.checked_duration_since(now)
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.inner.len());
        metrics::record_cache_size(self.inner.len());
        removed
    }

    pub fn clear(&self) -> usize {
        let count = self.inner.len();
        self.inner.clear();
        metrics::record_cache_size(0);
        count
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: self.inner.len(),
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    /// Write/read/delete probe used by readiness checks.
    pub fn ping(&self) -> bool {
        let key = format!("health_check:{}", uuid::Uuid::new_v4());
        self.set(key.clone(), Value::from("ok"), Some(Duration::from_secs(10)));
        let ok = self.inner.get(&key).is_some();
        self.inner.remove(&key);
        ok
    }
}

/// Match `text` against a pattern where `*` matches any run of characters.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) || text.len() < first.len() + last.len() {
        return false;
    }
    if !text[first.len()..].ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_delete() {
        let cache = Cache::new();
        assert!(cache.get("user:1").is_none());

        cache.set("user:1", json!({"email": "a@b.co"}), None);
        assert_eq!(cache.get("user:1").unwrap()["email"], "a@b.co");
        assert!(cache.delete("user:1"));
        assert!(!cache.exists("user:1"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_expiry() {
        let cache = Cache::new();
        cache.set("short", json!(1), Some(Duration::from_millis(20)));
        cache.set("long", json!(2), Some(Duration::from_secs(60)));
        assert!(cache.exists("short"));

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("short").is_none());
        assert_eq!(cache.get("long"), Some(json!(2)));
        assert!(cache.ttl("long").unwrap() > Duration::from_secs(50));
    }

    #[test]
    fn test_increment_keeps_ttl_from_creation() {
        let cache = Cache::new();
        assert_eq!(cache.increment("api_usage:u1:plantnet", 1, Some(Duration::from_secs(100))), 1);
        assert!(cache.expire("api_usage:u1:plantnet", Duration::from_secs(5)));
        assert_eq!(cache.increment("api_usage:u1:plantnet", 2, Some(Duration::from_secs(100))), 3);
        assert!(cache.ttl("api_usage:u1:plantnet").unwrap() <= Duration::from_secs(5));
    }

    #[test]
    fn test_increment_restarts_after_expiry() {
        let cache = Cache::new();
        cache.increment("counter", 5, Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.increment("counter", 1, None), 1);
    }

    #[test]
    fn test_delete_pattern_and_purge() {
        let cache = Cache::new();
        cache.set("api_usage:u1:plantnet", json!(1), None);
        cache.set("api_usage:u2:trefle", json!(1), None);
        cache.set("api_stats:plantnet:u1", json!({}), None);
        cache.set("gone", json!(0), Some(Duration::from_millis(1)));

        assert_eq!(cache.keys("api_usage:*").len(), 2);
        assert_eq!(cache.delete_pattern("api_usage:*"), 2);
        assert_eq!(cache.len(), 2);

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("a:*", "a:b:c"));
        assert!(glob_match("*:c", "a:b:c"));
        assert!(glob_match("a:*:c", "a:b:c"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("a:*:d", "a:b:c"));
        assert!(!glob_match("ab*ba", "aba"));
    }

    #[test]
    fn test_json_helpers() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Stats {
            success_rate: f64,
        }

        let cache = Cache::new();
        cache
            .set_json("api_stats:x", &Stats { success_rate: 0.5 }, None)
            .unwrap();
        assert_eq!(
            cache.get_json::<Stats>("api_stats:x"),
            Some(Stats { success_rate: 0.5 })
        );
        assert!(cache.ping());
    }
}
