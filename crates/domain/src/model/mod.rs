//! Ledger value types shared by the offset store, the registry and observers.
//!
//! Blocks and transactions are read-only snapshots produced by the ledger
//! collaborator; nothing in this workspace mutates them once read.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! ledger_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub const fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            /// Fresh random identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

ledger_id!(
    /// Identifier of a block.
    BlockId
);
ledger_id!(
    /// Identifier of a single transaction certificate.
    TransactionId
);
ledger_id!(
    /// Identifier of the logical entity a chain of transactions describes.
    ArtifactId
);
ledger_id!(ArtifactTypeId);
ledger_id!(TransactionTypeId);

impl BlockId {
    /// Synthetic block preceding height 1. Its height is always 0.
    pub const ROOT: BlockId = BlockId(Uuid::nil());

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl TransactionId {
    /// Reserved previous-transaction id of the first transaction of every
    /// artifact.
    pub const INITIAL: TransactionId = TransactionId(Uuid::nil());

    pub fn is_initial(&self) -> bool {
        *self == Self::INITIAL
    }
}

/// A single state change against one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub previous_transaction_id: TransactionId,
    pub artifact_id: ArtifactId,
    pub artifact_type: ArtifactTypeId,
    pub transaction_type: TransactionTypeId,
    pub previous_state: Option<i32>,
    pub new_state: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

/// An ordered, immutable batch of transactions chained to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_id: BlockId,
    pub previous_block_id: BlockId,
    pub height: u64,
    pub transactions: Vec<Transaction>,
}

/// Durable marker of the highest block whose notification cycle completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockOffset {
    pub block_id: BlockId,
    pub block_height: u64,
}

impl BlockOffset {
    pub const fn new(block_id: BlockId, block_height: u64) -> Self {
        Self {
            block_id,
            block_height,
        }
    }

    /// Offset used on first run and after a corrupt record is discarded.
    pub const fn root() -> Self {
        Self::new(BlockId::ROOT, 0)
    }

    pub fn is_root(&self) -> bool {
        self.block_id.is_root()
    }
}

impl Default for BlockOffset {
    fn default() -> Self {
        Self::root()
    }
}
