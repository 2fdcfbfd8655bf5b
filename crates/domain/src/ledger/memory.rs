use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::model::{
    ArtifactId, ArtifactTypeId, Block, BlockId, Transaction, TransactionId, TransactionTypeId,
};

use super::{Ledger, LedgerError, LedgerResult};

/// In-process ledger for embedding the notification subsystem without a
/// remote agent. Blocks are appended explicitly; heights start at 1.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    inner: RwLock<Chain>,
}

#[derive(Debug, Default)]
struct Chain {
    blocks: Vec<Block>,
    heights: HashMap<BlockId, usize>,
    transactions: HashMap<TransactionId, (Transaction, BlockId)>,
    artifact_heads: HashMap<ArtifactId, TransactionId>,
    unavailable: Option<String>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonizes a new block holding `transactions` and returns it.
    pub fn append_block(&self, transactions: Vec<Transaction>) -> Block {
        let mut chain = self.inner.write().expect("ledger lock poisoned");
        let previous_block_id = chain
            .blocks
            .last()
            .map(|block| block.block_id)
            .unwrap_or(BlockId::ROOT);
        let block = Block {
            block_id: BlockId::random(),
            previous_block_id,
            height: chain.blocks.len() as u64 + 1,
            transactions,
        };

        for tx in &block.transactions {
            chain
                .transactions
                .insert(tx.transaction_id, (tx.clone(), block.block_id));
            chain
                .artifact_heads
                .insert(tx.artifact_id, tx.transaction_id);
        }
        let index = chain.blocks.len();
        chain.heights.insert(block.block_id, index);
        chain.blocks.push(block.clone());
        block
    }

    /// Appends a transaction for `artifact_id`, chaining it to the artifact's
    /// current head, in a block of its own.
    pub fn append_transaction(
        &self,
        artifact_id: ArtifactId,
        artifact_type: ArtifactTypeId,
        transaction_type: TransactionTypeId,
        new_state: Option<i32>,
    ) -> (Block, Transaction) {
        let tx = self.next_transaction(artifact_id, artifact_type, transaction_type, new_state);
        let block = self.append_block(vec![tx.clone()]);
        (block, tx)
    }

    /// Builds (without canonizing) the next transaction for an artifact.
    pub fn next_transaction(
        &self,
        artifact_id: ArtifactId,
        artifact_type: ArtifactTypeId,
        transaction_type: TransactionTypeId,
        new_state: Option<i32>,
    ) -> Transaction {
        let chain = self.inner.read().expect("ledger lock poisoned");
        let head = chain.artifact_heads.get(&artifact_id).copied();
        let previous_state = head
            .and_then(|id| chain.transactions.get(&id))
            .and_then(|(tx, _)| tx.new_state);
        Transaction {
            transaction_id: TransactionId::random(),
            previous_transaction_id: head.unwrap_or(TransactionId::INITIAL),
            artifact_id,
            artifact_type,
            transaction_type,
            previous_state,
            new_state,
            timestamp: Utc::now(),
        }
    }

    /// Makes every read fail with `LedgerError::Unavailable` until cleared.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        let mut chain = self.inner.write().expect("ledger lock poisoned");
        chain.unavailable = reason.map(str::to_owned);
    }

    fn read(&self) -> LedgerResult<std::sync::RwLockReadGuard<'_, Chain>> {
        let chain = self.inner.read().expect("ledger lock poisoned");
        if let Some(reason) = &chain.unavailable {
            return Err(LedgerError::Unavailable(reason.clone()));
        }
        Ok(chain)
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn latest_block_id(&self) -> LedgerResult<BlockId> {
        let chain = self.read()?;
        Ok(chain
            .blocks
            .last()
            .map(|block| block.block_id)
            .unwrap_or(BlockId::ROOT))
    }

    async fn find_all_blocks_after(&self, block_id: BlockId) -> LedgerResult<Vec<Block>> {
        let chain = self.read()?;
        let start = if block_id.is_root() {
            0
        } else {
            match chain.heights.get(&block_id) {
                Some(index) => index + 1,
                None => return Err(LedgerError::BlockNotFound(block_id)),
            }
        };
        Ok(chain.blocks[start..].to_vec())
    }

    async fn find_block_by_id(&self, block_id: BlockId) -> LedgerResult<Option<Block>> {
        let chain = self.read()?;
        Ok(chain
            .heights
            .get(&block_id)
            .map(|index| chain.blocks[*index].clone()))
    }

    async fn find_transaction_by_id(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<Transaction>> {
        let chain = self.read()?;
        Ok(chain
            .transactions
            .get(&transaction_id)
            .map(|(tx, _)| tx.clone()))
    }

    async fn find_transaction_block_id(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<BlockId>> {
        let chain = self.read()?;
        Ok(chain
            .transactions
            .get(&transaction_id)
            .map(|(_, block_id)| *block_id))
    }

    async fn find_last_transaction_id_for_artifact(
        &self,
        artifact_id: ArtifactId,
    ) -> LedgerResult<Option<TransactionId>> {
        let chain = self.read()?;
        Ok(chain.artifact_heads.get(&artifact_id).copied())
    }

    async fn find_previous_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<TransactionId>> {
        let chain = self.read()?;
        Ok(chain
            .transactions
            .get(&transaction_id)
            .map(|(tx, _)| tx.previous_transaction_id))
    }
}
