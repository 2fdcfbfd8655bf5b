use std::sync::Arc;

use ledger_sentinel_domain::{ArtifactId, BlockId, Ledger, LedgerError, LedgerResult, Transaction};

/// Query answer paired with the block it was computed against.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    pub latest_block_id: BlockId,
    pub result: T,
}

/// Read-side queries for sentinels that were told about a block and now
/// need the history leading up to it.
#[derive(Clone)]
pub struct BlockchainSentinelHelper {
    ledger: Arc<dyn Ledger>,
}

impl BlockchainSentinelHelper {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Transactions for `artifact_id` in ascending order, limited to blocks
    /// no higher than `until_block_id` (the latest block when `None`).
    pub async fn find_transactions_for_artifact(
        &self,
        artifact_id: ArtifactId,
        until_block_id: Option<BlockId>,
    ) -> LedgerResult<QueryResult<Vec<Transaction>>> {
        let latest_block_id = match until_block_id {
            Some(block_id) => block_id,
            None => self.ledger.latest_block_id().await?,
        };
        let horizon = self.block_height(latest_block_id).await?;

        let mut transactions = Vec::new();
        let last = self
            .ledger
            .find_last_transaction_id_for_artifact(artifact_id)
            .await?;
        if let Some(mut transaction_id) = last {
            loop {
                let block_id = self
                    .ledger
                    .find_transaction_block_id(transaction_id)
                    .await?
                    .ok_or(LedgerError::BlockNotFoundForTransaction(transaction_id))?;

                let previous = if self.block_height(block_id).await? > horizon {
                    // newer than the horizon, skip it
                    match self
                        .ledger
                        .find_previous_transaction_id(transaction_id)
                        .await?
                    {
                        Some(previous) => previous,
                        None => break,
                    }
                } else {
                    let transaction = self
                        .ledger
                        .find_transaction_by_id(transaction_id)
                        .await?
                        .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
                    let previous = transaction.previous_transaction_id;
                    transactions.push(transaction);
                    previous
                };

                if previous.is_initial() {
                    break;
                }
                transaction_id = previous;
            }
        }

        transactions.reverse();
        Ok(QueryResult {
            latest_block_id,
            result: transactions,
        })
    }

    async fn block_height(&self, block_id: BlockId) -> LedgerResult<u64> {
        if block_id.is_root() {
            return Ok(0);
        }
        self.ledger
            .find_block_by_id(block_id)
            .await?
            .map(|block| block.height)
            .ok_or(LedgerError::BlockNotFound(block_id))
    }
}
