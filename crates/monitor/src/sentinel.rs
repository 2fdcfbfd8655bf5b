use std::sync::Arc;

use async_trait::async_trait;
use ledger_sentinel_domain::{
    BlockId, ConfigDef, Criteria, Ledger, LedgerError, SentinelConfigError, Settings,
};
use thiserror::Error;

/// Observer invoked when a block satisfies the criteria it last returned.
///
/// A sentinel is called at most once per criteria: the value returned from
/// `notify` schedules the next callback, `None` ends the registration.
#[async_trait]
pub trait Sentinel: Send {
    /// Settings the sentinel expects to find under `sentinel.<name>.*`.
    fn config(&self) -> ConfigDef;

    /// Produces the initial criteria once the registry starts.
    async fn start(
        &mut self,
        settings: &Settings,
        ledger: Arc<dyn Ledger>,
    ) -> Result<Criteria, SentinelError>;

    async fn notify(
        &mut self,
        latest_block_id: BlockId,
        criteria: &Criteria,
    ) -> Result<Option<Criteria>, SentinelError>;
}

#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("{0}")]
    Failed(String),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("config error: {0}")]
    Config(#[from] SentinelConfigError),
    #[error("sentinel panicked: {0}")]
    Panicked(String),
}

impl SentinelError {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}
