use std::sync::Arc;

use async_trait::async_trait;
use ledger_sentinel_domain::{Block, BlockId, Ledger, LedgerError, OffsetStore, StorageError};
use metrics::{counter, gauge};
use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::registry::{NotifySummary, RegistryError};

/// Receiver of newly canonized blocks, implemented by `SentinelRegistry`.
#[async_trait]
pub trait BlockNotifier: Send + Sync {
    async fn notify_block(&self, block: &Block) -> Result<NotifySummary, RegistryError>;
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Drains new blocks from the ledger into a notifier, recording progress in
/// an offset store so that a block is announced once across restarts.
pub struct SentinelPollerTask {
    ledger: Arc<dyn Ledger>,
    offsets: Arc<dyn OffsetStore>,
    notifier: Arc<dyn BlockNotifier>,
    high_water_mark: BlockId,
}

impl SentinelPollerTask {
    /// Loads the recorded offset and replays that block once, which only
    /// moves the high-water mark since the block is already processed.
    pub async fn new(
        ledger: Arc<dyn Ledger>,
        offsets: Arc<dyn OffsetStore>,
        notifier: Arc<dyn BlockNotifier>,
    ) -> Result<Self, PollerError> {
        let offset = offsets.initialize().await?;
        let mut task = Self {
            ledger,
            offsets,
            notifier,
            high_water_mark: BlockId::ROOT,
        };

        if !offset.is_root() {
            let block = task
                .ledger
                .find_block_by_id(offset.block_id)
                .await?
                .ok_or(LedgerError::BlockNotFound(offset.block_id))?;
            task.process_block(&block).await?;
        }
        debug!(high_water_mark = %task.high_water_mark, "sentinel poller ready");
        Ok(task)
    }

    pub fn current_high_water_mark(&self) -> BlockId {
        self.high_water_mark
    }

    /// Processes every block after the high-water mark in ascending height
    /// order and returns how many were examined.
    pub async fn process_latest_blocks(&mut self) -> Result<usize, PollerError> {
        let blocks = self
            .ledger
            .find_all_blocks_after(self.high_water_mark)
            .await?;
        for block in &blocks {
            self.process_block(block).await?;
        }
        Ok(blocks.len())
    }

    async fn process_block(&mut self, block: &Block) -> Result<(), PollerError> {
        if self.offsets.is_block_processed(block.height).await? {
            counter!("sentinel_blocks_total", "result" => "skipped").increment(1);
            trace!(height = block.height, block_id = %block.block_id, "block already processed");
        } else {
            info!(height = block.height, block_id = %block.block_id, "notifying block");
            match self.notifier.notify_block(block).await {
                Ok(summary) => {
                    counter!("sentinel_blocks_total", "result" => "notified").increment(1);
                    debug!(height = block.height, ?summary, "block fan-out finished");
                }
                // not retried; the block is still recorded below
                Err(err) => {
                    counter!("sentinel_blocks_total", "result" => "notify_failed").increment(1);
                    error!(
                        height = block.height,
                        block_id = %block.block_id,
                        error = %err,
                        "error notifying sentinels of new block"
                    );
                }
            }
            self.offsets
                .record_block(block.block_id, block.height)
                .await?;
            gauge!("sentinel_offset_height").set(block.height as f64);
        }

        self.high_water_mark = block.block_id;
        Ok(())
    }
}
