//! On-disk JSON snapshots with atomic replace.
//!
//! A snapshot is written to a hidden sibling temp file, synced, and renamed
//! over the target. Readers therefore only ever observe the previous or the
//! new document, never a partial one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{PersistenceError, StoreError};
use crate::store::record::Sessions;

/// One partition file under the data directory.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl SnapshotFile {
    pub fn new(data_dir: &Path, partition: &str) -> Self {
        Self {
            path: data_dir.join(format!("{partition}.json")),
            tmp_path: data_dir.join(format!(".{partition}.json.tmp")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last committed snapshot. `None` when nothing was ever written.
    pub async fn load(&self) -> Result<Option<Sessions>, StoreError> {
        // A temp file left behind means a write died before its rename; the
        // target still holds the previous snapshot.
        match fs::remove_file(&self.tmp_path).await {
            Ok(()) => tracing::warn!(
                path = %self.tmp_path.display(),
                "Discarded interrupted snapshot write"
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.tmp_path.display(),
                error = %e,
                "Could not remove stale snapshot temp file"
            ),
        }

        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let sessions = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(sessions))
    }

    /// Atomically replace the snapshot with `sessions`.
    pub async fn write(&self, sessions: &Sessions) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(sessions)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| PersistenceError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        self.write_tmp(&json).await.map_err(|source| PersistenceError::Write {
            path: self.tmp_path.clone(),
            source,
        })?;

        fs::rename(&self.tmp_path, &self.path)
            .await
            .map_err(|source| PersistenceError::Write {
                path: self.path.clone(),
                source,
            })?;

        // Make the rename itself durable. Not every platform lets a directory
        // be opened for syncing, so failure here is only logged.
        if let Some(parent) = self.path.parent() {
            if let Err(e) = sync_dir(parent).await {
                tracing::debug!(path = %parent.display(), error = %e, "Directory sync skipped");
            }
        }

        tracing::trace!(path = %self.path.display(), sessions = sessions.len(), "Snapshot written");
        Ok(())
    }

    async fn write_tmp(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(&self.tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }
}

async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::SessionRecord;
    use chrono::Utc;

    fn sample() -> Sessions {
        let mut sessions = Sessions::new();
        sessions.insert("abc".into(), SessionRecord::new("u1:80", Utc::now()));
        sessions
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path(), "sessions");
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path(), "sessions");
        let sessions = sample();

        file.write(&sessions).await.unwrap();
        assert_eq!(file.load().await.unwrap(), Some(sessions));
        assert!(!dir.path().join(".sessions.json.tmp").exists());
    }

    #[tokio::test]
    async fn interrupted_write_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path(), "sessions");
        let committed = sample();
        file.write(&committed).await.unwrap();

        // Simulate a crash halfway through the next write.
        std::fs::write(dir.path().join(".sessions.json.tmp"), b"{\"abc\": {\"tar").unwrap();

        let loaded = file.load().await.unwrap();
        assert_eq!(loaded, Some(committed));
        assert!(!dir.path().join(".sessions.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_target_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sessions.json"), b"not json").unwrap();
        let file = SnapshotFile::new(dir.path(), "sessions");
        assert!(matches!(file.load().await, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn creates_missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let file = SnapshotFile::new(&nested, "sessions");
        file.write(&sample()).await.unwrap();
        assert!(nested.join("sessions.json").exists());
    }
}
