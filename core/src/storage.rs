//! Persistent client key/value storage.
//!
//! Plays the role browser local storage has for the web client: a flat map
//! of string keys to string values, written through to a JSON file on every
//! mutation. There is no schema versioning; each key is an independent scalar.

use crate::{MedLensError, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// String key/value store backed by a JSON file (or memory only)
pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, String>>,
}

impl LocalStore {
    /// Open (or create) a store at `path`. A missing file starts empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            HashMap::new()
        };

        info!(target: "storage", path = %path.display(), keys = entries.len(), "Local store opened");
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// Volatile store, used by tests and when no storage path is configured
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get value by key
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().ok()?.get(key).cloned()
    }

    /// Store key-value pair and write through
    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), value.into());
        debug!(target: "storage", key = %key, "Stored value");
        self.persist(&entries)
    }

    /// Delete key
    pub fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.lock()?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&entries)
    }

    /// Delete several keys with a single write
    pub fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.lock()?;
        for key in keys {
            entries.remove(*key);
        }
        self.persist(&entries)
    }

    /// Force the current contents to disk
    pub fn flush(&self) -> Result<()> {
        let entries = self.lock()?;
        self.persist(&entries)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| MedLensError::StorageError("local store lock poisoned".to_string()))
    }

    // Caller holds the entries lock, so writes land in mutation order
    fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, entries)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
