//! Local record persistence
//!
//! Records are opaque JSON objects grouped in named collections (`devis`,
//! `factures`, `files`, `clients`, `layoutProfiles`, `societe`). The vault only ever hands encrypted records to a
//! store; ids are the only plaintext.
//!
//! Two backends:
//!   - **memory**: a map, gone with the process
//!   - **JSON file**: loaded whole into memory, rewritten atomically via
//!     temp file + rename after every mutation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::error::{SyncError, SyncResult};

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

pub trait RecordStore: Send + Sync {
    fn get(&self, collection: &str, id: &str) -> SyncResult<Option<Value>>;
    /// Insert or replace.
    fn put(&self, collection: &str, id: &str, record: Value) -> SyncResult<()>;
    /// Returns whether a record was removed.
    fn delete(&self, collection: &str, id: &str) -> SyncResult<bool>;
    /// All `(id, record)` pairs of a collection, ordered by id.
    fn list(&self, collection: &str) -> SyncResult<Vec<(String, Value)>>;

    fn ids(&self, collection: &str) -> SyncResult<Vec<String>> {
        Ok(self.list(collection)?.into_iter().map(|(id, _)| id).collect())
    }
}

fn lock(m: &Mutex<Collections>) -> MutexGuard<'_, Collections> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn list_of(collections: &Collections, collection: &str) -> Vec<(String, Value)> {
    collections
        .get(collection)
        .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn remove_from(collections: &mut Collections, collection: &str, id: &str) -> bool {
    collections
        .get_mut(collection)
        .is_some_and(|c| c.remove(id).is_some())
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    collections: Mutex<Collections>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, collection: &str, id: &str) -> SyncResult<Option<Value>> {
        Ok(lock(&self.collections)
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    fn put(&self, collection: &str, id: &str, record: Value) -> SyncResult<()> {
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), record);
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> SyncResult<bool> {
        Ok(remove_from(&mut lock(&self.collections), collection, id))
    }

    fn list(&self, collection: &str) -> SyncResult<Vec<(String, Value)>> {
        Ok(list_of(&lock(&self.collections), collection))
    }
}

/// Record store persisted to a single JSON file
#[derive(Debug)]
pub struct JsonFileRecordStore {
    path: PathBuf,
    collections: Mutex<Collections>,
}

impl JsonFileRecordStore {
    /// Load or create a store at the given path.
    /// If the file doesn't exist, starts empty.
    pub fn open(path: &Path) -> SyncResult<Self> {
        let collections = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                SyncError::Store(format!("parsing record store {}: {e}", path.display()))
            })?
        } else {
            Collections::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            collections: Mutex::new(collections),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomic write: temp file, then rename over the store. Callers install
    /// `collections` in memory only after this succeeds.
    fn flush(&self, collections: &Collections) -> SyncResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(collections)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl RecordStore for JsonFileRecordStore {
    fn get(&self, collection: &str, id: &str) -> SyncResult<Option<Value>> {
        Ok(lock(&self.collections)
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    fn put(&self, collection: &str, id: &str, record: Value) -> SyncResult<()> {
        let mut collections = lock(&self.collections);
        let mut next = collections.clone();
        next.entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), record);
        self.flush(&next)?;
        *collections = next;
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> SyncResult<bool> {
        let mut collections = lock(&self.collections);
        if !collections.get(collection).is_some_and(|c| c.contains_key(id)) {
            return Ok(false);
        }
        let mut next = collections.clone();
        remove_from(&mut next, collection, id);
        self.flush(&next)?;
        *collections = next;
        Ok(true)
    }

    fn list(&self, collection: &str) -> SyncResult<Vec<(String, Value)>> {
        Ok(list_of(&lock(&self.collections), collection))
    }
}
