use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ledger_sentinel_domain::{BlockId, BlockOffset, OffsetStore, StorageError, StorageResult};
use tokio::fs;
use tracing::{debug, warn};

/// Offset store persisting a single JSON record in a local file.
///
/// Every `record_block` rewrites the whole record through a sibling temp
/// file followed by a rename, so readers never see a torn write.
#[derive(Debug, Clone)]
pub struct FileSystemOffsetStore {
    path: PathBuf,
}

impl FileSystemOffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut raw = self.path.clone().into_os_string();
        raw.push(".tmp");
        PathBuf::from(raw)
    }

    async fn read_latest(&self) -> StorageResult<BlockOffset> {
        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|err| StorageError::from_io(format!("{}: {err}", self.path.display())))?;
        serde_json::from_str(&text).map_err(|err| {
            StorageError::from_io(format!("{} is corrupt: {err}", self.path.display()))
        })
    }

    async fn write(&self, offset: &BlockOffset) -> StorageResult<()> {
        let encoded = serde_json::to_vec(offset).map_err(StorageError::from_io)?;
        let temp = self.temp_path();
        fs::write(&temp, encoded)
            .await
            .map_err(|err| StorageError::from_io(format!("{}: {err}", temp.display())))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|err| StorageError::from_io(format!("{}: {err}", self.path.display())))?;
        Ok(())
    }

    async fn reset(&self) -> StorageResult<BlockOffset> {
        let root = BlockOffset::root();
        self.write(&root).await?;
        Ok(root)
    }
}

#[async_trait]
impl OffsetStore for FileSystemOffsetStore {
    async fn initialize(&self) -> StorageResult<BlockOffset> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "creating offset log at root");
                return self.reset().await;
            }
            Err(err) => {
                return Err(StorageError::from_io(format!(
                    "{}: {err}",
                    self.path.display()
                )))
            }
        };

        match serde_json::from_str::<BlockOffset>(&text) {
            Ok(offset) => Ok(offset),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "offset log is unreadable, resetting to root"
                );
                self.reset().await
            }
        }
    }

    async fn is_block_processed(&self, block_height: u64) -> StorageResult<bool> {
        let latest = self.read_latest().await?;
        Ok(latest.block_height >= block_height)
    }

    async fn record_block(&self, block_id: BlockId, block_height: u64) -> StorageResult<()> {
        self.write(&BlockOffset::new(block_id, block_height)).await
    }
}
