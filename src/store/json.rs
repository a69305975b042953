//! File-backed JSON document store.
//!
//! The whole document is loaded once, read synchronously from memory, and
//! written back to disk on an explicit [`JsonStore::sync`]. I/O failures are
//! logged and never crash the process; the in-memory value stays
//! authoritative.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;

/// A JSON object persisted to a single file.
pub struct JsonStore {
    path: PathBuf,
    value: RwLock<Map<String, Value>>,
    /// Serializes flushes so writes never interleave.
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Load the document at `path`, creating an empty one if it is absent.
    ///
    /// A missing, empty, or unparseable file yields an empty object.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let value = match fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => Map::new(),
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    warn!(path = %path.display(), kind = %json_kind(&other), "Store root is not an object, starting empty");
                    Map::new()
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse store, starting empty");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Store file missing, creating");
                if let Err(e) = write_atomic(&path, b"{}").await {
                    warn!(path = %path.display(), error = %e, "Failed to create store file");
                }
                Map::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read store, starting empty");
                Map::new()
            }
        };

        Self {
            path,
            value: RwLock::new(value),
            write_lock: Mutex::new(()),
        }
    }

    /// Deserialize the value stored under `key`, if present and well-formed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.read(|map| map.get(key).cloned())?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key = %key, error = %e, "Stored value has unexpected shape");
                None
            }
        }
    }

    /// Whether `key` exists.
    pub fn contains(&self, key: &str) -> bool {
        self.read(|map| map.contains_key(key))
    }

    /// Run `f` against the in-memory document.
    pub fn read<R>(&self, f: impl FnOnce(&Map<String, Value>) -> R) -> R {
        let guard = self.value.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Mutate the in-memory document.
    pub fn update<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Write the full document to disk.
    ///
    /// The file is replaced atomically, so readers never observe a partial
    /// write. Failures are logged and returned; memory is left untouched.
    pub async fn sync(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let bytes = self.read(to_pretty_json)?;
        if let Err(e) = write_atomic(&self.path, &bytes).await {
            warn!(path = %self.path.display(), error = %e, "Failed to write store");
            return Err(e);
        }
        debug!(path = %self.path.display(), bytes = bytes.len(), "Store synced");
        Ok(())
    }
}

/// Pretty-print with four-space indentation.
fn to_pretty_json(map: &Map<String, Value>) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    map.serialize(&mut serializer)?;
    Ok(out)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).await.map_err(io_err)?;
    fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
