use std::str::FromStr;

use async_trait::async_trait;
use ledger_sentinel_domain::{BlockId, BlockOffset, OffsetStore, StorageError, StorageResult};
use sea_orm::{sea_query::OnConflict, ActiveValue::Set, EntityTrait};
use tracing::warn;

use crate::{entity::sentinel_offset, SeaOrmStorage};

const OFFSET_KEY: &str = "sentinel";

impl SeaOrmStorage {
    async fn load_offset(&self) -> StorageResult<Option<sentinel_offset::Model>> {
        sentinel_offset::Entity::find_by_id(OFFSET_KEY.to_string())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)
    }

    async fn store_offset(&self, offset: BlockOffset) -> StorageResult<()> {
        let height = i64::try_from(offset.block_height).map_err(StorageError::from_source)?;
        let model = sentinel_offset::ActiveModel {
            key: Set(OFFSET_KEY.to_string()),
            block_id: Set(offset.block_id.to_string()),
            block_height: Set(height),
        };

        sentinel_offset::Entity::insert(model)
            .on_conflict(
                OnConflict::column(sentinel_offset::Column::Key)
                    .update_columns([
                        sentinel_offset::Column::BlockId,
                        sentinel_offset::Column::BlockHeight,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }
}

fn decode(model: &sentinel_offset::Model) -> Option<BlockOffset> {
    let block_id = BlockId::from_str(&model.block_id).ok()?;
    let height = u64::try_from(model.block_height).ok()?;
    Some(BlockOffset::new(block_id, height))
}

#[async_trait]
impl OffsetStore for SeaOrmStorage {
    async fn initialize(&self) -> StorageResult<BlockOffset> {
        if let Some(model) = self.load_offset().await? {
            if let Some(offset) = decode(&model) {
                return Ok(offset);
            }
            warn!(
                block_id = %model.block_id,
                block_height = model.block_height,
                "stored offset is unreadable, resetting to root"
            );
        }
        let root = BlockOffset::root();
        self.store_offset(root).await?;
        Ok(root)
    }

    async fn is_block_processed(&self, block_height: u64) -> StorageResult<bool> {
        let stored = match self.load_offset().await? {
            Some(model) => u64::try_from(model.block_height).unwrap_or(0),
            None => 0,
        };
        Ok(stored >= block_height)
    }

    async fn record_block(&self, block_id: BlockId, block_height: u64) -> StorageResult<()> {
        self.store_offset(BlockOffset::new(block_id, block_height))
            .await
    }
}
