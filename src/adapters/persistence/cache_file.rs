//! Cache File - Atomic Whole-File JSON Cache
//!
//! Stores the two-generation snapshot as one JSON document. Writes go
//! to a sibling tmp file which is then renamed over the target, so a
//! reader sees either the old or the new document, never a partial one.
//! A missing file is "no cache", not an error.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument};

use crate::domain::error::CacheError;
use crate::ports::repository::CacheStore;

/// File-backed `CacheStore`.
#[derive(Debug, Clone)]
pub struct CacheFile {
    /// Final cache path.
    path: PathBuf,
    /// Sibling path used for atomic writes.
    tmp_path: PathBuf,
}

impl CacheFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");

        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheStore for CacheFile {
    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    async fn read(&self) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "Cache file read");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, bytes), fields(path = %self.path.display()), level = "debug")]
    async fn write(&self, bytes: &[u8]) -> Result<(), CacheError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }

        fs::write(&self.tmp_path, bytes).await?;
        fs::rename(&self.tmp_path, &self.path).await?;

        debug!(bytes = bytes.len(), "Cache file replaced");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::domain::error::{Classify, ErrorClass};

    #[tokio::test]
    async fn test_missing_file_is_no_cache() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheFile::new(tmp.path().join("absent.json"));
        assert!(cache.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_creates_dirs_and_replaces() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested");
        let cache = CacheFile::new(nested.join("state.json"));

        cache.write(b"{\"v\":1}").await.unwrap();
        cache.write(b"{\"v\":2}").await.unwrap();

        assert_eq!(cache.read().await.unwrap().unwrap(), b"{\"v\":2}".to_vec());
        assert!(!nested.join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_unreadable_path_is_soft() {
        let tmp = TempDir::new().unwrap();
        // a directory where the file should be
        let cache = CacheFile::new(tmp.path());

        let err = cache.read().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Soft);
    }
}
