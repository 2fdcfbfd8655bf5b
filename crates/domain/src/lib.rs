//! Domain-level building blocks shared by the storage and monitor crates:
//! ledger value types and the read interface onto the ledger, the criteria
//! language observers use to express interest, the offset store contract,
//! observer settings, and the configuration/telemetry plumbing every host
//! shares.

pub mod config;
pub mod criteria;
pub mod ledger;
pub mod model;
pub mod services;
pub mod settings;
pub mod storage;

pub use criteria::{ArtifactIdAndState, Criteria, CriteriaError, CriteriaKind};
pub use ledger::{InMemoryLedger, Ledger, LedgerError, LedgerResult};
pub use model::{
    ArtifactId, ArtifactTypeId, Block, BlockId, BlockOffset, Transaction, TransactionId,
    TransactionTypeId,
};
pub use settings::{
    ConfigDef, ConfigDefBuilder, ConfigKey, ConfigType, Properties, SentinelConfigError,
    SettingValue, Settings,
};
pub use storage::*;
