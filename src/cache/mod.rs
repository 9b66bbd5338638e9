//! Process-wide response cache.
//!
//! Holds the last successful result of every cache-enabled store, keyed by a
//! derived cache key. The in-memory map is a bounded LRU; an optional
//! [`PersistentCache`] backing is consulted only when the memory map misses
//! and is written through on every [`CacheStore::set`].
//!
//! Expiry is lazy: an entry older than the caller's TTL is evicted when it is
//! next read, there is no background sweep.
//!
//! # Key Derivation
//!
//! | Descriptor | Cache mode | Key |
//! |------------|-----------|-----|
//! | path `/users` | `On` | `key_/users` |
//! | path `/users` | `ByBody(|b| b["id"])` with `id: 7` | `key_/users_7` |
//! | URL function returning `/users/7` | `On` | `key_/users/7` |
//! | any descriptor | `Key("a")` | `key_a` (shared by every store naming `a`) |
//! | custom request | `On` | configuration error |
//!
//! # Examples
//!
//! ```
//! use art_fetch::cache::{create_cache_key, CacheEntry, CacheStore};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let cache = CacheStore::new(16, None);
//! let key = create_cache_key(Some("/users"), None);
//! cache.set(&key, CacheEntry::new(json!([1, 2, 3]), None, None));
//!
//! let hit = cache.get_fresh(&key, Some(Duration::from_secs(60))).unwrap();
//! assert_eq!(hit.data, json!([1, 2, 3]));
//! ```

mod persistent;

pub use persistent::{CallbackPersistence, JsonFilePersistence, PersistentCache};

use crate::pagination::PageSnapshot;
use crate::types::Body;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const KEY_PREFIX: &str = "key";

/// Build a cache key from a request identity and an optional suffix.
pub fn create_cache_key(identity: Option<&str>, suffix: Option<&str>) -> String {
    let mut key = String::from(KEY_PREFIX);
    for part in [identity, suffix].into_iter().flatten() {
        key.push('_');
        key.push_str(part);
    }
    key
}

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// One cached result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Post-transform data of the successful call
    pub data: Value,
    /// Body the data was fetched with
    #[serde(default)]
    pub body: Option<Body>,
    /// Write time, milliseconds since the Unix epoch
    pub time: u64,
    /// Pagination state of paged stores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageSnapshot>,
}

impl CacheEntry {
    /// Entry stamped with the current time
    pub fn new(data: Value, body: Option<Body>, pagination: Option<PageSnapshot>) -> Self {
        CacheEntry {
            data,
            body,
            time: now_millis(),
            pagination,
        }
    }

    /// Time since the entry was written
    pub fn age(&self) -> Duration {
        Duration::from_millis(now_millis().saturating_sub(self.time))
    }

    /// Whether the entry outlived `ttl`; no TTL means it never expires
    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.age() > ttl)
    }
}

/// Shared cache map. Cloning yields another handle to the same entries.
#[derive(Clone)]
pub struct CacheStore {
    entries: Arc<Mutex<LruCache<String, CacheEntry>>>,
    persistence: Option<Arc<dyn PersistentCache>>,
}

impl CacheStore {
    /// Create a cache holding at most `capacity` entries in memory
    pub fn new(capacity: usize, persistence: Option<Arc<dyn PersistentCache>>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        CacheStore {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            persistence,
        }
    }

    /// Look up an entry, falling back to the persistent backing on a miss
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.entries.lock().get(key) {
            return Some(entry.clone());
        }
        let persistence = self.persistence.as_ref()?;
        match persistence.get(key) {
            Ok(Some(entry)) => {
                tracing::debug!("cache {} restored from persistent backing", key);
                self.entries.lock().put(key.to_string(), entry.clone());
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("persistent cache read for {} failed: {}", key, e);
                None
            }
        }
    }

    /// Look up an entry that has not outlived `ttl`, evicting it if it has
    pub fn get_fresh(&self, key: &str, ttl: Option<Duration>) -> Option<CacheEntry> {
        let entry = self.get(key)?;
        if entry.is_expired(ttl) {
            tracing::debug!("cache {} expired after {:?}", key, entry.age());
            self.clear(key);
            return None;
        }
        Some(entry)
    }

    /// Store an entry, writing through to the persistent backing
    pub fn set(&self, key: &str, entry: CacheEntry) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.set(key, &entry) {
                tracing::warn!("persistent cache write for {} failed: {}", key, e);
            }
        }
        self.entries.lock().put(key.to_string(), entry);
    }

    /// Remove an entry everywhere
    pub fn clear(&self, key: &str) {
        self.entries.lock().pop(key);
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.clear(key) {
                tracing::warn!("persistent cache clear for {} failed: {}", key, e);
            }
        }
    }

    /// Number of entries held in memory
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the memory map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        CacheStore::new(1024, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry_aged(secs: u64) -> CacheEntry {
        let mut entry = CacheEntry::new(json!({"id": 1}), None, None);
        entry.time = now_millis() - secs * 1000;
        entry
    }

    #[test]
    fn test_create_cache_key() {
        assert_eq!(create_cache_key(Some("/users"), None), "key_/users");
        assert_eq!(create_cache_key(Some("/users"), Some("7")), "key_/users_7");
        assert_eq!(create_cache_key(None, Some("7")), "key_7");
    }

    #[test]
    fn test_set_get_clear() {
        let cache = CacheStore::default();
        cache.set("k", CacheEntry::new(json!(1), None, None));
        assert_eq!(cache.get("k").unwrap().data, json!(1));
        cache.clear("k");
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lazy_expiry() {
        let cache = CacheStore::default();
        cache.set("old", entry_aged(120));
        assert!(cache.get_fresh("old", Some(Duration::from_secs(300))).is_some());
        assert!(cache.get_fresh("old", Some(Duration::from_secs(60))).is_none());
        // evicted on that read
        assert!(cache.get("old").is_none());
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let cache = CacheStore::default();
        cache.set("old", entry_aged(100_000));
        assert!(cache.get_fresh("old", None).is_some());
    }

    #[test]
    fn test_capacity_bound() {
        let cache = CacheStore::new(2, None);
        for key in ["a", "b", "c"] {
            cache.set(key, CacheEntry::new(json!(key), None, None));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_clone_shares_entries() {
        let cache = CacheStore::default();
        let other = cache.clone();
        cache.set("k", CacheEntry::new(json!(true), None, None));
        assert!(other.get("k").is_some());
    }
}
