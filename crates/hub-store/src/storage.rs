//! Versioned JSON persistence for rule data
//!
//! Each stored document lives in `<data_dir>/.storage/<key>` as
//! ```json
//! {
//!   "version": 1,
//!   "minor_version": 1,
//!   "key": "hub.rules",
//!   "data": { ... }
//! }
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::{StoreError, StoreResult};

/// Storage file wrapper with version tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version, bumped on breaking layout changes
    pub version: u32,
    pub minor_version: u32,
    /// File name under the storage directory
    pub key: String,
    pub data: T,
}

impl<T> StorageFile<T> {
    /// Wrap `data` for storage under `key`
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Types persisted as a single storage document
pub trait Storable: Serialize + DeserializeOwned {
    /// File name under the storage directory
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32;
}

/// Handle on the `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// Storage rooted at `<data_dir>/.storage`; nothing is created until the first save
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: data_dir.as_ref().join(".storage"),
        }
    }

    /// The `.storage` directory itself
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Path of the document stored under `key`
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    async fn ensure_dir(&self) -> StoreResult<()> {
        if !fs::try_exists(&self.storage_dir).await? {
            fs::create_dir_all(&self.storage_dir).await?;
            debug!(dir = ?self.storage_dir, "Created storage directory");
        }
        Ok(())
    }

    /// Load a document; `None` when it was never saved
    ///
    /// A different major version is an error, an older minor version is
    /// accepted with a warning.
    pub async fn load<T: Storable>(&self) -> StoreResult<Option<T>> {
        let path = self.file_path(T::KEY);
        if !fs::try_exists(&path).await? {
            debug!(key = T::KEY, "Storage file not found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;

        #[derive(Deserialize)]
        struct VersionInfo {
            version: u32,
            minor_version: u32,
        }
        let info: VersionInfo = serde_json::from_str(&content)?;
        if info.version != T::VERSION {
            return Err(StoreError::VersionMismatch {
                key: T::KEY.to_string(),
                expected: T::VERSION,
                found: info.version,
            });
        }
        if info.minor_version < T::MINOR_VERSION {
            warn!(
                key = T::KEY,
                found = info.minor_version,
                current = T::MINOR_VERSION,
                "Storage file has an older minor version"
            );
        }

        let file: StorageFile<T> = serde_json::from_str(&content)?;
        debug!(key = T::KEY, version = file.version, "Loaded storage file");
        Ok(Some(file.data))
    }

    /// Write a document atomically (temp file, then rename)
    pub async fn save<T: Storable>(&self, data: &T) -> StoreResult<()> {
        self.ensure_dir().await?;

        let file = StorageFile::new(T::KEY, data, T::VERSION, T::MINOR_VERSION);
        let content = serde_json::to_string_pretty(&file)?;

        let path = self.file_path(T::KEY);
        let temp_path = self.file_path(&format!("{}.tmp", T::KEY));
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(key = T::KEY, "Saved storage file");
        Ok(())
    }
}
