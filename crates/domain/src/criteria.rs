//! Point-in-time filters describing which future blocks an observer wants.
//!
//! A `Criteria` always names the block it was issued at (`latest_block_id`)
//! and at most one discriminator. Values are never mutated; advancing a
//! registration means building a new `Criteria`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ArtifactId, ArtifactTypeId, BlockId, TransactionTypeId};

/// Artifact plus the state value the observer last saw for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactIdAndState {
    pub artifact_id: ArtifactId,
    pub state: i32,
}

impl ArtifactIdAndState {
    pub const fn new(artifact_id: ArtifactId, state: i32) -> Self {
        Self { artifact_id, state }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criteria {
    /// Latest block id as of which the observer last looked at the ledger.
    pub latest_block_id: Option<BlockId>,
    /// Fires when the artifact moves to a state other than the stored one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id_and_state: Option<ArtifactIdAndState>,
    /// Fires on any new transaction for the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<ArtifactId>,
    /// Fires on new transactions for any artifact of this type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type_id: Option<ArtifactTypeId>,
    /// Fires on transactions of this type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionTypeId>,
}

/// Copied-out view of the single discriminator of a validated `Criteria`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaKind {
    AnyBlock,
    ArtifactIdAndState(ArtifactIdAndState),
    ArtifactId(ArtifactId),
    ArtifactTypeId(ArtifactTypeId),
    TransactionType(TransactionTypeId),
}

/// Raised when a `Criteria` has an invalid kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("invalid criteria: latestBlockId is mandatory")]
    MissingLatestBlockId,
    #[error(
        "invalid criteria: only latestBlockId plus at most one additional discriminator is allowed ({count} given)"
    )]
    TooManyDiscriminators { count: usize },
}

impl Criteria {
    /// "Notify me of any block after this one."
    pub fn with_latest_block_id(block_id: BlockId) -> Self {
        Self {
            latest_block_id: Some(block_id),
            ..Self::default()
        }
    }

    pub fn for_artifact(mut self, artifact_id: ArtifactId) -> Self {
        self.artifact_id = Some(artifact_id);
        self
    }

    pub fn for_artifact_state(mut self, artifact_id: ArtifactId, state: i32) -> Self {
        self.artifact_id_and_state = Some(ArtifactIdAndState::new(artifact_id, state));
        self
    }

    pub fn for_artifact_type(mut self, artifact_type_id: ArtifactTypeId) -> Self {
        self.artifact_type_id = Some(artifact_type_id);
        self
    }

    pub fn for_transaction_type(mut self, transaction_type: TransactionTypeId) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    /// Fails fast on a malformed criteria; returns it untouched otherwise.
    pub fn validate(self) -> Result<Self, CriteriaError> {
        if self.latest_block_id.is_none() {
            return Err(CriteriaError::MissingLatestBlockId);
        }

        let count = self.discriminator_count();
        if count > 1 {
            return Err(CriteriaError::TooManyDiscriminators { count });
        }

        Ok(self)
    }

    /// Copies this criteria with a new `latest_block_id`. `None` means the
    /// registration should not be re-armed.
    pub fn with_block_id(&self, block_id: Option<BlockId>) -> Option<Self> {
        block_id.map(|id| Self {
            latest_block_id: Some(id),
            ..self.clone()
        })
    }

    /// Discriminator in precedence order. Callers are expected to have
    /// validated the criteria; with several set, the first in order wins.
    pub fn kind(&self) -> CriteriaKind {
        if let Some(id) = self.artifact_id {
            CriteriaKind::ArtifactId(id)
        } else if let Some(id) = self.artifact_type_id {
            CriteriaKind::ArtifactTypeId(id)
        } else if let Some(id) = self.transaction_type {
            CriteriaKind::TransactionType(id)
        } else if let Some(state) = self.artifact_id_and_state {
            CriteriaKind::ArtifactIdAndState(state)
        } else {
            CriteriaKind::AnyBlock
        }
    }

    fn discriminator_count(&self) -> usize {
        [
            self.artifact_id_and_state.is_some(),
            self.artifact_id.is_some(),
            self.artifact_type_id.is_some(),
            self.transaction_type.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}
