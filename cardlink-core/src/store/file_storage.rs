//! JSON file backend for [`KeyValueStore`].
//!
//! All keys live in one `store.json` document. Writes go through a temp
//! file in the same directory that is then renamed over the original, so
//! readers never observe a half-written document.

use super::KeyValueStore;
use crate::error::CardlinkError;
use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const STORE_FILENAME: &str = "store.json";

#[derive(Debug)]
pub struct FileStore {
    store_file: PathBuf,
    // read-modify-write of the document within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(store_file: PathBuf) -> Result<Self, CardlinkError> {
        if let Some(parent) = store_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                info!(cache_dir = %parent.display(), "Created store directory");
            }
        }
        Ok(FileStore {
            store_file,
            write_lock: Mutex::new(()),
        })
    }

    /// Store in `cache_dir`, or the platform cache directory when `None`.
    pub fn in_cache_dir(cache_dir: Option<PathBuf>) -> Result<Self, CardlinkError> {
        let dir = match cache_dir {
            Some(dir) => dir,
            None => Self::default_cache_dir()?,
        };
        Self::new(dir.join(STORE_FILENAME))
    }

    pub fn default_cache_dir() -> Result<PathBuf, CardlinkError> {
        ProjectDirs::from("", "", "cardlink")
            .map(|proj_dirs| proj_dirs.cache_dir().to_path_buf())
            .ok_or_else(|| CardlinkError::Cache("Could not determine cache directory".to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.store_file
    }

    /// Delete the whole store document.
    pub fn clear(&self) -> Result<(), CardlinkError> {
        let _guard = self.lock()?;
        if self.store_file.exists() {
            fs::remove_file(&self.store_file)?;
            info!(store_file = %self.store_file.display(), "Removed store file");
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, CardlinkError> {
        self.write_lock
            .lock()
            .map_err(|_| CardlinkError::Cache("Store lock poisoned".to_string()))
    }

    fn load_all(&self) -> Result<BTreeMap<String, String>, CardlinkError> {
        if !self.store_file.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.store_file)?;
        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                // a corrupt store is treated as empty; the next write replaces it
                warn!(
                    store_file = %self.store_file.display(),
                    error = %e,
                    "Store file unreadable, ignoring it"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn save_all(&self, entries: &BTreeMap<String, String>) -> Result<(), CardlinkError> {
        let parent = self
            .store_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let json = serde_json::to_string_pretty(entries)?;
        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file
            .persist(&self.store_file)
            .map_err(|e| CardlinkError::Io(e.error))?;

        debug!(
            store_file = %self.store_file.display(),
            entries = entries.len(),
            "Saved store to disk"
        );
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CardlinkError> {
        Ok(self.load_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CardlinkError> {
        let _guard = self.lock()?;
        let mut entries = self.load_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.save_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), CardlinkError> {
        let _guard = self.lock()?;
        let mut entries = self.load_all()?;
        if entries.remove(key).is_some() {
            self.save_all(&entries)?;
        }
        Ok(())
    }

    fn strategy_name(&self) -> &'static str {
        "file"
    }
}
