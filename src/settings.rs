use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::warn;

use crate::db::write_atomic;
use crate::error::codes;
use crate::{AppError, AppResult};

pub const LAST_AUTO_BACKUP_KEY: &str = "lastAutoBackupAt";

/// Small key-value persistence for process-wide state that must survive a
/// restart.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn save(&self) -> anyhow::Result<()>;
}

/// Flat JSON object on disk. Values are loaded once and written back on
/// `save` through a temp file and rename.
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let data = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
                Ok(map) => map,
                Err(err) => {
                    // A corrupt file loses only the cached timestamp; start empty.
                    warn!(
                        target: "readshelf",
                        event = "settings_parse_failed",
                        path = %path.display(),
                        error = %err
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(AppError::new(codes::SETTINGS_READ, "Failed to read settings")
                    .with_context("path", path.display().to_string())
                    .with_cause(err))
            }
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value.to_string());
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        let payload = {
            let guard = self
                .data
                .lock()
                .map_err(|_| anyhow::anyhow!("settings lock poisoned"))?;
            serde_json::to_vec_pretty(&*guard)?
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create settings dir {}", parent.display()))?;
        }
        write_atomic(&self.path, &payload)
            .with_context(|| format!("write settings {}", self.path.display()))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, String>>,
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value.to_string());
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn SettingsStore>,
}

impl StoreHandle {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { inner: store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    pub fn json_file(path: impl Into<PathBuf>) -> AppResult<Self> {
        Ok(Self::new(Arc::new(JsonFileStore::open(path)?)))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    /// Set and persist in one step.
    pub fn put(&self, key: &str, value: &str) -> AppResult<()> {
        self.inner.set(key, value);
        self.inner.save().map_err(|err| {
            AppError::new(codes::SETTINGS_WRITE, "Failed to save settings")
                .with_context("key", key)
                .with_cause(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn json_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let handle = StoreHandle::json_file(&path).unwrap();
        assert_eq!(handle.get(LAST_AUTO_BACKUP_KEY), None);
        handle
            .put(LAST_AUTO_BACKUP_KEY, "2026-10-18T08:00:00.000Z")
            .unwrap();

        let reopened = StoreHandle::json_file(&path).unwrap();
        assert_eq!(
            reopened.get(LAST_AUTO_BACKUP_KEY).as_deref(),
            Some("2026-10-18T08:00:00.000Z")
        );
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, b"{not json").unwrap();
        let handle = StoreHandle::json_file(&path).unwrap();
        assert_eq!(handle.get(LAST_AUTO_BACKUP_KEY), None);
    }

    #[test]
    fn memory_store_is_isolated_per_handle() {
        let a = StoreHandle::in_memory();
        let b = StoreHandle::in_memory();
        a.put("k", "v").unwrap();
        assert_eq!(a.get("k").as_deref(), Some("v"));
        assert_eq!(b.get("k"), None);
    }
}
