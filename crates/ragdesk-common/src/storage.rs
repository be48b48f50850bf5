//! File-backed key/value storage
//!
//! Every key maps to one JSON file inside the storage directory. Keys are
//! restricted to `[A-Za-z0-9_.-]` so a key can never escape the directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

/// Local key/value store for client state (sessions, messages, auth, prefs)
#[derive(Debug, Clone)]
pub struct ClientStorage {
    root: PathBuf,
}

impl ClientStorage {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("ClientStorage opened at {:?}", root);
        Ok(Self { root })
    }

    /// Open the store in the platform data directory (`<data_dir>/ragdesk`)
    pub fn open_default() -> StorageResult<Self> {
        let base = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
        Self::open(base.join("ragdesk"))
    }

    /// Storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{}.json", key)))
    }

    /// Read a value, `None` when the key is absent
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Read a value, treating unreadable or corrupt entries as absent
    pub fn get_lossy<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring unreadable storage entry '{}': {}", key, e);
                None
            }
        }
    }

    /// Write a value, replacing any previous one
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let json = serde_json::to_string_pretty(value)?;
        // Write-then-rename via a unique temp file in the same directory
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!("Stored key '{}'", key);
        Ok(())
    }

    /// Remove a key, returning whether it existed
    pub fn remove(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        debug!("Removed key '{}'", key);
        Ok(true)
    }

    /// Check whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.exists()).unwrap_or(false)
    }

    /// List keys starting with `prefix`, sorted
    pub fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem.starts_with(prefix) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
