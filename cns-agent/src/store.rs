//! Key/value persistence for service and endpoint state.
//!
//! A store is one JSON object. Every write replaces the whole object on disk:
//! the new content goes to a temporary file in the same directory which is
//! then renamed over the target, so a crash never leaves a half-written file.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

/// Key of the service state (pool, NCs, orchestrator identity).
pub const SERVICE_STATE_KEY: &str = "ContainerNetworkService";

/// Key of the endpoint state.
pub const ENDPOINTS_KEY: &str = "Endpoints";

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store file or the key within it does not exist.
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Capability interface over a persisted JSON object.
pub trait KeyValueStore: Send + Sync {
    /// Replace `key` and flush the whole object.
    fn write(&self, key: &str, value: Value) -> Result<()>;

    /// Read `key`. A missing store or key is [`StoreError::NotFound`].
    fn read(&self, key: &str) -> Result<Value>;

    /// Delete the backing object entirely.
    fn remove(&self) -> Result<()>;

    fn exists(&self) -> bool;

    /// Last time the backing object was written.
    fn modification_time(&self) -> Result<SystemTime>;
}

/// Typed helpers over any [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    fn write_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.write(key, serde_json::to_value(value)?)
    }

    fn read_typed<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.read(key)?;
        Ok(serde_json::from_value(value)?)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// File backed store.
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes writers within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (without reading) the store at `path`, creating parent directories.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        Ok(serde_json::from_slice(&content)?)
    }

    fn flush(&self, object: &Map<String, Value>) -> Result<()> {
        let content = serde_json::to_vec_pretty(object)?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "store".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        fs::write(&tmp, &content)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(path = %self.path.display(), bytes = content.len(), "Store flushed");
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn write(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut object = match self.load() {
            Ok(object) => object,
            Err(StoreError::NotFound(_)) => Map::new(),
            Err(e) => return Err(e),
        };
        object.insert(key.to_string(), value);
        self.flush(&object)
    }

    fn read(&self, key: &str) -> Result<Value> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut object = self.load()?;
        object
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn remove(&self) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn modification_time(&self) -> Result<SystemTime> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.modified()?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(self.path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Option<(HashMap<String, Value>, SystemTime)>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value of `key`, if any.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read(key).ok()
    }

    /// Make every write fail with an I/O error until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Override the recorded modification time.
    pub fn set_modification_time(&self, time: SystemTime) {
        if let Ok(mut inner) = self.inner.lock() {
            let entry = inner.get_or_insert_with(|| (HashMap::new(), time));
            entry.1 = time;
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn write(&self, key: &str, value: Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "write refused").into());
        }
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let entry = inner.get_or_insert_with(|| (HashMap::new(), SystemTime::now()));
        entry.0.insert(key.to_string(), value);
        entry.1 = SystemTime::now();
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Value> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        inner
            .as_ref()
            .and_then(|(map, _)| map.get(key).cloned())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn remove(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        *inner = None;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.inner.lock().map(|inner| inner.is_some()).unwrap_or(false)
    }

    fn modification_time(&self) -> Result<SystemTime> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        inner
            .as_ref()
            .map(|(_, time)| *time)
            .ok_or_else(|| StoreError::NotFound("memory store".to_string()))
    }
}
