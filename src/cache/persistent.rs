//! Persistent backings for the response cache.
//!
//! A backing survives the process; the in-memory map in front of it does
//! not. Backing failures never fail a request: [`CacheStore`](super::CacheStore)
//! logs them and carries on with the memory map alone.

use super::CacheEntry;
use crate::error::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Storage consulted when the in-memory cache misses.
pub trait PersistentCache: Send + Sync {
    /// Read an entry
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Write an entry
    fn set(&self, key: &str, entry: &CacheEntry) -> Result<()>;

    /// Remove an entry
    fn clear(&self, key: &str) -> Result<()>;
}

type GetFn = Arc<dyn Fn(&str) -> Option<CacheEntry> + Send + Sync>;
type SetFn = Arc<dyn Fn(&str, &CacheEntry) + Send + Sync>;
type ClearFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Backing built from injected get/set/clear callbacks.
///
/// # Examples
///
/// ```
/// use art_fetch::cache::{CallbackPersistence, PersistentCache};
/// use std::collections::HashMap;
/// use std::sync::{Arc, Mutex};
///
/// let storage = Arc::new(Mutex::new(HashMap::new()));
/// let (get_store, set_store, clear_store) = (storage.clone(), storage.clone(), storage.clone());
/// let backing = CallbackPersistence::new(
///     move |key| get_store.lock().unwrap().get(key).cloned(),
///     move |key, entry| { set_store.lock().unwrap().insert(key.to_string(), entry.clone()); },
///     move |key| { clear_store.lock().unwrap().remove(key); },
/// );
/// assert!(backing.get("missing").unwrap().is_none());
/// ```
#[derive(Clone)]
pub struct CallbackPersistence {
    get: GetFn,
    set: SetFn,
    clear: ClearFn,
}

impl CallbackPersistence {
    /// Wrap the three callbacks
    pub fn new(
        get: impl Fn(&str) -> Option<CacheEntry> + Send + Sync + 'static,
        set: impl Fn(&str, &CacheEntry) + Send + Sync + 'static,
        clear: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        CallbackPersistence {
            get: Arc::new(get),
            set: Arc::new(set),
            clear: Arc::new(clear),
        }
    }
}

impl PersistentCache for CallbackPersistence {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok((self.get)(key))
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        (self.set)(key, entry);
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        (self.clear)(key);
        Ok(())
    }
}

/// Backing that keeps one JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    dir: PathBuf,
}

impl JsonFilePersistence {
    /// Use `dir`, creating it if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(JsonFilePersistence { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl PersistentCache for JsonFilePersistence {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let bytes = serde_json::to_vec(entry)?;
        fs::write(self.path_for(key), bytes)?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backing = JsonFilePersistence::new(dir.path()).unwrap();
        let entry = CacheEntry::new(json!({"name": "ada"}), None, None);

        backing.set("key_/users/1", &entry).unwrap();
        assert_eq!(backing.get("key_/users/1").unwrap(), Some(entry));

        backing.clear("key_/users/1").unwrap();
        assert!(backing.get("key_/users/1").unwrap().is_none());
        // clearing twice is fine
        backing.clear("key_/users/1").unwrap();
    }

    #[test]
    fn test_store_falls_back_to_backing() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Arc::new(JsonFilePersistence::new(dir.path()).unwrap());

        let writer = CacheStore::new(8, Some(backing.clone()));
        writer.set("key_/a", CacheEntry::new(json!(1), None, None));

        // a fresh memory map, same backing
        let reader = CacheStore::new(8, Some(backing));
        assert!(reader.is_empty());
        assert_eq!(reader.get("key_/a").unwrap().data, json!(1));
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn test_callbacks_written_through() {
        let storage: Arc<Mutex<HashMap<String, CacheEntry>>> = Arc::default();
        let (g, s, c) = (storage.clone(), storage.clone(), storage.clone());
        let backing = CallbackPersistence::new(
            move |key| g.lock().get(key).cloned(),
            move |key, entry| {
                s.lock().insert(key.to_string(), entry.clone());
            },
            move |key| {
                c.lock().remove(key);
            },
        );
        let cache = CacheStore::new(8, Some(Arc::new(backing)));
        cache.set("k", CacheEntry::new(json!("v"), None, None));
        assert!(storage.lock().contains_key("k"));
        cache.clear("k");
        assert!(storage.lock().is_empty());
    }
}
