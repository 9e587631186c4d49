/*
    file_baseline.rs - File-backed baseline slot

    One file per slot. Writes go to a temp file which is fsynced and then
    renamed over the previous baseline, so readers see either the old or the
    new baseline and never a torn one.

    Format: [magic "MSBL0001"][version u8][bincode RecordSet]
*/

use crate::core_sync::model::RecordSet;
use crate::core_sync::store::errors::PersistError;
use crate::core_sync::store::traits::BaselineStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Magic header for baseline files
const MAGIC_HEADER: &[u8; 8] = b"MSBL0001";

/// Current baseline format version
const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC_HEADER.len() + 1;

/// Baseline slot persisted to a single file
#[derive(Debug, Clone)]
pub struct FileBaselineStore {
    path: PathBuf,
}

impl FileBaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Slot `<dir>/<name>.baseline`
    pub fn in_dir(dir: impl AsRef<Path>, name: &str) -> Self {
        Self::new(dir.as_ref().join(format!("{}.baseline", name)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(baseline: &RecordSet) -> Result<Vec<u8>, PersistError> {
        let body = bincode::serialize(baseline)?;
        let mut data = Vec::with_capacity(HEADER_LEN + body.len());
        data.extend_from_slice(MAGIC_HEADER);
        data.push(FORMAT_VERSION);
        data.extend_from_slice(&body);
        Ok(data)
    }

    fn decode(data: &[u8]) -> Result<RecordSet, PersistError> {
        if data.len() < HEADER_LEN || &data[..MAGIC_HEADER.len()] != MAGIC_HEADER {
            return Err(PersistError::Corrupted("invalid baseline header".to_string()));
        }
        let version = data[MAGIC_HEADER.len()];
        if version != FORMAT_VERSION {
            return Err(PersistError::Corrupted(format!(
                "unsupported baseline version: {}",
                version
            )));
        }
        bincode::deserialize(&data[HEADER_LEN..])
            .map_err(|e| PersistError::Corrupted(e.to_string()))
    }
}

#[async_trait]
impl BaselineStore for FileBaselineStore {
    async fn read(&self) -> Result<RecordSet, PersistError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Self::decode(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no baseline yet, starting empty");
                Ok(RecordSet::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, baseline: RecordSet) -> Result<(), PersistError> {
        let data = Self::encode(&baseline)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path).await?;
        debug!(path = %self.path.display(), records = baseline.len(), "baseline written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sync::model::{Record, RecordId};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileBaselineStore::in_dir(dir.path(), "left.own");
        assert!(store.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = FileBaselineStore::in_dir(dir.path(), "left.own");

        let baseline = RecordSet::from_records(vec![
            Record::with_id(1, "one").with_attribute("read", true),
            Record::tombstone(RecordId(2)),
        ])
        .unwrap();
        store.write(baseline.clone()).await.unwrap();

        let loaded = store.read().await.unwrap();
        assert!(loaded.same_contents(&baseline));
        assert!(loaded.is_tombstoned(RecordId(2)));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = FileBaselineStore::in_dir(dir.path(), "slot");

        store
            .write(RecordSet::from_records(vec![Record::with_id(1, "a")]).unwrap())
            .await
            .unwrap();
        store.write(RecordSet::new()).await.unwrap();

        assert!(store.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_header_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileBaselineStore::in_dir(dir.path(), "slot");
        tokio::fs::write(store.path(), b"garbage").await.unwrap();

        let err = store.read().await.unwrap_err();
        assert!(matches!(err, PersistError::Corrupted(_)));
    }

    #[tokio::test]
    async fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = FileBaselineStore::in_dir(dir.path().join("nested/state"), "slot");
        store.write(RecordSet::new()).await.unwrap();
        assert!(store.path().exists());
    }
}
