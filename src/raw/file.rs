//! Directory-backed raw store
//!
//! One file per key inside a single directory, using `tokio::fs`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};

use super::{RawInfo, RawStore};

/// Filesystem implementation of RawStore
///
/// Keys map directly to file names, so they must be valid file names
/// (no separators). The directory is created lazily on first write.
#[derive(Debug, Clone)]
pub struct FileRawStore {
    root: PathBuf,
}

impl FileRawStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the stored files
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(StoreError::RawStore(format!("invalid key for file store: {key:?}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl RawStore for FileRawStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).await?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(value).await?;
        file.sync_all().await?;
        trace!(path = %path.display(), len = value.len(), "set");
        Ok(())
    }

    async fn append(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(value).await?;
        file.sync_all().await?;
        trace!(path = %path.display(), len = value.len(), "append");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_keys(&self) -> Result<Vec<String>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => keys.push(name),
                Err(name) => debug!(?name, "Skipping non UTF-8 file name"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get_info(&self, key: &str) -> Result<Option<RawInfo>> {
        let path = self.path_for(key)?;
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let last_modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Ok(Some(RawInfo {
            size: metadata.len(),
            last_modified,
        }))
    }

    async fn reset(&self) -> Result<()> {
        for key in self.get_keys().await? {
            self.remove(&key).await?;
        }
        Ok(())
    }
}
