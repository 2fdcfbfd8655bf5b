use async_trait::async_trait;
use thiserror::Error;

use crate::model::{BlockId, BlockOffset};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("offset log i/o error: {0}")]
    Io(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }

    pub fn from_io(err: impl std::fmt::Display) -> Self {
        Self::Io(err.to_string())
    }
}

/// Durable, single-writer record of the highest block whose notification
/// cycle has completed.
///
/// Heights decide whether a block was processed; ids are only carried so a
/// restarted poller can find the block again. The store does not enforce
/// monotonic heights: callers record blocks in ascending order, and only
/// after every registry finished with them.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Returns the last recorded offset, creating the root record when none
    /// exists or the persisted one cannot be read back.
    async fn initialize(&self) -> StorageResult<BlockOffset>;

    async fn is_block_processed(&self, block_height: u64) -> StorageResult<bool>;

    /// Overwrites the stored offset.
    async fn record_block(&self, block_id: BlockId, block_height: u64) -> StorageResult<()>;
}
