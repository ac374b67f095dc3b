use std::path::PathBuf;

use bytes::Bytes;
use tracing::{debug, info};

/// Local folder of encoded scene pictures, one file per identifier.
#[derive(Debug, Clone)]
pub struct PictureStore {
    root: PathBuf,
}

impl PictureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the data folder if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::CreateDir(self.root.display().to_string(), e))?;
        info!(path = self.root.display().to_string(), "picture folder ready");
        Ok(())
    }

    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.root.join(format!("{identifier}.jpg"))
    }

    /// Write a JPEG under `identifier`, replacing any previous file.
    pub async fn put_picture(&self, identifier: &str, jpeg: Bytes) -> Result<PathBuf, StorageError> {
        let path = self.path_for(identifier);
        let size = jpeg.len();
        tokio::fs::write(&path, &jpeg)
            .await
            .map_err(|e| StorageError::Write(path.display().to_string(), e))?;
        debug!(path = path.display().to_string(), size, "stored picture");
        Ok(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to create folder {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(String, std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_picture_under_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let store = PictureStore::new(dir.path().join("data"));
        store.ensure_dir().await.unwrap();

        let path = store
            .put_picture("2024-02-18T09_30_00.123_on", Bytes::from_static(b"\xFF\xD8jpeg"))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("data/2024-02-18T09_30_00.123_on.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\xFF\xD8jpeg");
    }

    #[tokio::test]
    async fn missing_folder_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PictureStore::new(dir.path().join("absent"));
        let err = store.put_picture("x", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::Write(..)));
    }
}
