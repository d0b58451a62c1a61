//! Persisted key/value state.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use libre_core::{StateError, StateStore};

/// Process-local store, gone when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        let values = self.values.read().map_err(|_| StateError::LockPoisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StateError> {
        let mut values = self.values.write().map_err(|_| StateError::LockPoisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StateError> {
        let mut values = self.values.write().map_err(|_| StateError::LockPoisoned)?;
        values.clear();
        Ok(())
    }
}

/// Store kept as a JSON object in one file.
///
/// The file and its parent directories are created on first write. Every
/// operation rereads the file, so several processes sharing a path see
/// each other's writes (last writer wins).
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StateError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| StateError::Serialization {
            reason: e.to_string(),
        })
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let contents =
            serde_json::to_string_pretty(values).map_err(|e| StateError::Serialization {
                reason: e.to_string(),
            })?;
        std::fs::write(&self.path, contents).map_err(|e| self.io_error(e))
    }

    fn io_error(&self, e: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

impl StateStore for FileStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StateError> {
        let _guard = self.write_lock.lock().map_err(|_| StateError::LockPoisoned)?;
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }

    fn clear(&self) -> Result<(), StateError> {
        let _guard = self.write_lock.lock().map_err(|_| StateError::LockPoisoned)?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}
