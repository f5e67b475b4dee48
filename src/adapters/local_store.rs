use crate::domain::ports::LocalStore;
use crate::utils::error::{AuctionError, Result};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// One JSON file per key under `base_path`. Writes go to a temporary file
/// that is renamed over the previous copy.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    base_path: PathBuf,
}

impl FileStateStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }

    fn store_error(key: &str, source: std::io::Error) -> AuctionError {
        AuctionError::LocalStoreError {
            key: key.to_string(),
            source,
        }
    }
}

impl LocalStore for FileStateStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::store_error(key, e)),
        }
    }

    async fn save(&self, key: &str, data: &str) -> Result<()> {
        let full_path = self.path_for(key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::store_error(key, e))?;
        }

        let tmp_path = full_path.with_extension("json.tmp");
        fs::write(&tmp_path, data).map_err(|e| Self::store_error(key, e))?;
        fs::rename(&tmp_path, &full_path).map_err(|e| Self::store_error(key, e))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::store_error(key, e)),
        }
    }
}

/// In-process store for ephemeral sessions. An optional byte quota makes
/// oversized writes fail the way a full disk would.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Arc::default(),
            quota: Some(quota),
        }
    }
}

impl LocalStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, data: &str) -> Result<()> {
        if let Some(quota) = self.quota {
            if data.len() > quota {
                return Err(AuctionError::LocalStoreError {
                    key: key.to_string(),
                    source: std::io::Error::new(
                        ErrorKind::Other,
                        format!("quota exceeded: {} bytes > {} bytes", data.len(), quota),
                    ),
                });
            }
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), data.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}
