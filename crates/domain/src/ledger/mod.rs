//! Narrow read interface onto the ledger collaborator.
//!
//! The remote agent, its certificate codec and connection pool live outside
//! this workspace; anything able to answer these queries can drive the
//! notification subsystem.

mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ArtifactId, Block, BlockId, Transaction, TransactionId};

pub use memory::InMemoryLedger;

/// Common result alias for ledger reads.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("block {0} not found")]
    BlockNotFound(BlockId),
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("block for transaction {0} not found")]
    BlockNotFoundForTransaction(TransactionId),
}

impl LedgerError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Id of the highest block, `BlockId::ROOT` on an empty ledger.
    async fn latest_block_id(&self) -> LedgerResult<BlockId>;

    /// Every block strictly after `block_id`, in ascending height order, as of
    /// the time of the call.
    async fn find_all_blocks_after(&self, block_id: BlockId) -> LedgerResult<Vec<Block>>;

    async fn find_block_by_id(&self, block_id: BlockId) -> LedgerResult<Option<Block>>;

    async fn find_transaction_by_id(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<Transaction>>;

    /// Block that canonized the given transaction.
    async fn find_transaction_block_id(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<BlockId>>;

    /// Newest transaction recorded for the artifact.
    async fn find_last_transaction_id_for_artifact(
        &self,
        artifact_id: ArtifactId,
    ) -> LedgerResult<Option<TransactionId>>;

    /// Predecessor link of the given transaction; `TransactionId::INITIAL`
    /// for the first transaction of an artifact.
    async fn find_previous_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Option<TransactionId>>;
}
