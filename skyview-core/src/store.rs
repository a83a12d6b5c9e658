//! Key-value persistence for favorites and recent searches.
//!
//! Values are whole JSON documents; callers always read and write a key
//! in full.

use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

use crate::error::StoreError;

pub const FAVORITES_KEY: &str = "favorite_locations";
pub const RECENT_SEARCHES_KEY: &str = "recent_searches";

pub trait KeyValueStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Decode the JSON value stored under `key`, if any.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StoreError::Serde { key: key.to_string(), source })
}

pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)
        .map_err(|source| StoreError::Serde { key: key.to_string(), source })?;
    store.set(key, raw)
}

/// Process-local store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// A single JSON file holding every key. Rewritten in full on each `set`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the file at `path`, starting empty if it doesn't exist yet.
    ///
    /// A file that isn't valid JSON is moved aside to `<path>.bad` and the
    /// store starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;
            match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!("Ignoring unreadable state file {}: {}", path.display(), err);
                    let backup = path.with_extension("json.bad");
                    if let Err(err) = fs::rename(&path, &backup) {
                        tracing::warn!("Failed to move {} aside: {}", path.display(), err);
                    }
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();

        let mut next = entries.clone();
        next.insert(key.to_string(), value);

        let contents = serde_json::to_string_pretty(&next).map_err(|source| StoreError::Serde {
            key: key.to_string(),
            source,
        })?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;

        // Write a sibling temp file, then rename over the target.
        let mut tmp = NamedTempFile::new_in(parent).map_err(|source| io_error(parent, source))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|source| io_error(tmp.path(), source))?;
        tmp.persist(&self.path)
            .map_err(|err| io_error(&self.path, err.error))?;

        *entries = next;
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.display().to_string(), source }
}
