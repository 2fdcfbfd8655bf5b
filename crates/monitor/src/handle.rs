use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;
use ledger_sentinel_domain::{
    Block, BlockId, Criteria, CriteriaKind, Ledger, LedgerResult, Settings,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error};

use crate::sentinel::{Sentinel, SentinelError};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Active,
    Cancelled,
}

/// Request to drop one registration, drained by the owning registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CancelIntent {
    pub name: String,
    pub handle_id: u64,
}

/// Result of handing one block to a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    Rearmed,
    OptedOut,
    Failed,
}

/// Binds one sentinel to its settings, status and current criteria.
///
/// Handles are cheap to clone; every clone observes the same registration.
#[derive(Clone)]
pub struct RegistrationHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: u64,
    name: String,
    sentinel: Arc<AsyncMutex<Box<dyn Sentinel>>>,
    settings: Settings,
    ledger: Arc<dyn Ledger>,
    state: Mutex<HandleState>,
    cancellations: Sender<CancelIntent>,
}

struct HandleState {
    status: RegistrationStatus,
    criteria: Criteria,
}

impl RegistrationHandle {
    pub(crate) fn new(
        name: String,
        sentinel: Box<dyn Sentinel>,
        settings: Settings,
        ledger: Arc<dyn Ledger>,
        cancellations: Sender<CancelIntent>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
                name,
                sentinel: Arc::new(AsyncMutex::new(sentinel)),
                settings,
                ledger,
                state: Mutex::new(HandleState {
                    status: RegistrationStatus::Active,
                    criteria: Criteria::with_latest_block_id(BlockId::ROOT),
                }),
                cancellations,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn status(&self) -> RegistrationStatus {
        self.inner.state.lock().expect("mutex poisoned").status
    }

    pub fn is_active(&self) -> bool {
        self.status() == RegistrationStatus::Active
    }

    pub fn criteria(&self) -> Criteria {
        self.inner
            .state
            .lock()
            .expect("mutex poisoned")
            .criteria
            .clone()
    }

    pub fn set_criteria(&self, criteria: Criteria) {
        self.inner.state.lock().expect("mutex poisoned").criteria = criteria;
    }

    /// Stops future notifications and asks the registry to forget this
    /// registration. Calling it again has no effect.
    pub fn cancel(&self) {
        {
            let mut state = self.inner.state.lock().expect("mutex poisoned");
            if state.status == RegistrationStatus::Cancelled {
                return;
            }
            state.status = RegistrationStatus::Cancelled;
        }

        let intent = CancelIntent {
            name: self.inner.name.clone(),
            handle_id: self.inner.id,
        };
        if self.inner.cancellations.send(intent).is_err() {
            debug!(sentinel = %self.inner.name, "registry already dropped, cancel is local only");
        }
    }

    /// Decides whether `block` satisfies the current criteria. Every
    /// transaction in the block is inspected.
    pub async fn is_triggered_by(&self, block: &Block) -> LedgerResult<bool> {
        let criteria = self.criteria();
        match criteria.kind() {
            CriteriaKind::ArtifactId(artifact_id) => Ok(block
                .transactions
                .iter()
                .any(|tx| tx.artifact_id == artifact_id)),
            CriteriaKind::ArtifactTypeId(artifact_type) => Ok(block
                .transactions
                .iter()
                .any(|tx| tx.artifact_type == artifact_type)),
            CriteriaKind::TransactionType(transaction_type) => Ok(block
                .transactions
                .iter()
                .any(|tx| tx.transaction_type == transaction_type)),
            CriteriaKind::ArtifactIdAndState(expected) => {
                for tx in block
                    .transactions
                    .iter()
                    .filter(|tx| tx.artifact_id == expected.artifact_id)
                {
                    // the block copy is not trusted for state
                    let stored = self
                        .inner
                        .ledger
                        .find_transaction_by_id(tx.transaction_id)
                        .await?;
                    let changed = stored
                        .and_then(|stored| stored.new_state)
                        .is_some_and(|state| state != expected.state);
                    if changed {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            CriteriaKind::AnyBlock => Ok(true),
        }
    }

    /// Runs the sentinel's `start` on its own task.
    pub(crate) async fn start_sentinel(&self) -> Result<Criteria, SentinelError> {
        let mut sentinel = self.inner.sentinel.clone().lock_owned().await;
        let settings = self.inner.settings.clone();
        let ledger = self.inner.ledger.clone();
        let task = tokio::spawn(async move { sentinel.start(&settings, ledger).await });

        task.await
            .map_err(|err| SentinelError::Panicked(err.to_string()))?
    }

    /// Hands `block_id` to the sentinel on its own task and applies the
    /// criteria it returns. Errors and panics leave the handle untouched.
    pub(crate) async fn dispatch(&self, block_id: BlockId) -> DispatchOutcome {
        let criteria = self.criteria();
        let mut sentinel = self.inner.sentinel.clone().lock_owned().await;
        let task = tokio::spawn(async move { sentinel.notify(block_id, &criteria).await });

        match task.await {
            Ok(Ok(Some(next))) => match next.validate() {
                Ok(next) => {
                    self.set_criteria(next);
                    DispatchOutcome::Rearmed
                }
                Err(err) => {
                    error!(
                        sentinel = %self.inner.name,
                        %block_id,
                        error = %err,
                        "sentinel returned invalid criteria"
                    );
                    DispatchOutcome::Failed
                }
            },
            Ok(Ok(None)) => {
                debug!(sentinel = %self.inner.name, %block_id, "sentinel opted out");
                self.cancel();
                DispatchOutcome::OptedOut
            }
            Ok(Err(err)) => {
                error!(
                    sentinel = %self.inner.name,
                    %block_id,
                    error = %err,
                    "error notifying sentinel of new block"
                );
                DispatchOutcome::Failed
            }
            Err(err) => {
                error!(
                    sentinel = %self.inner.name,
                    %block_id,
                    error = %err,
                    "sentinel panicked while handling block"
                );
                DispatchOutcome::Failed
            }
        }
    }
}

impl fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{recorded, Reply, ScriptedSentinel};
    use crossbeam_channel::unbounded;
    use ledger_sentinel_domain::{ArtifactId, ArtifactTypeId, InMemoryLedger, TransactionTypeId};

    fn handle_for(
        ledger: Arc<InMemoryLedger>,
        reply: Reply,
    ) -> (
        RegistrationHandle,
        crossbeam_channel::Receiver<CancelIntent>,
        crate::testing::Calls,
    ) {
        let (tx, rx) = unbounded();
        let (sentinel, calls) = ScriptedSentinel::new(reply);
        let handle =
            RegistrationHandle::new("probe".into(), sentinel.boxed(), Settings::new(), ledger, tx);
        (handle, rx, calls)
    }

    #[test]
    fn new_handle_is_active_at_root() {
        let (handle, _rx, _) = handle_for(Arc::new(InMemoryLedger::new()), Reply::Advance);
        assert!(handle.is_active());
        assert_eq!(handle.criteria(), Criteria::with_latest_block_id(BlockId::ROOT));
    }

    #[test]
    fn cancel_is_idempotent_and_sends_one_intent() {
        let (handle, rx, _) = handle_for(Arc::new(InMemoryLedger::new()), Reply::Advance);
        handle.cancel();
        handle.clone().cancel();

        assert_eq!(handle.status(), RegistrationStatus::Cancelled);
        let intents: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            intents,
            vec![CancelIntent {
                name: "probe".into(),
                handle_id: handle.id(),
            }]
        );
    }

    #[tokio::test]
    async fn discriminators_scan_every_transaction() {
        let ledger = Arc::new(InMemoryLedger::new());
        let artifact = ArtifactId::random();
        let artifact_type = ArtifactTypeId::random();
        let tx_type = TransactionTypeId::random();
        let first = ledger.next_transaction(
            ArtifactId::random(),
            ArtifactTypeId::random(),
            TransactionTypeId::random(),
            None,
        );
        let second = ledger.next_transaction(artifact, artifact_type, tx_type, None);
        let block = ledger.append_block(vec![first, second]);

        let (handle, _rx, _) = handle_for(ledger.clone(), Reply::Advance);
        let base = Criteria::with_latest_block_id(BlockId::ROOT);

        handle.set_criteria(base.clone().for_artifact(artifact));
        assert!(handle.is_triggered_by(&block).await.unwrap());
        handle.set_criteria(base.clone().for_artifact_type(artifact_type));
        assert!(handle.is_triggered_by(&block).await.unwrap());
        handle.set_criteria(base.clone().for_transaction_type(tx_type));
        assert!(handle.is_triggered_by(&block).await.unwrap());

        handle.set_criteria(base.clone().for_artifact(ArtifactId::random()));
        assert!(!handle.is_triggered_by(&block).await.unwrap());

        handle.set_criteria(base);
        assert!(handle.is_triggered_by(&block).await.unwrap());
    }

    #[tokio::test]
    async fn state_criteria_triggers_only_on_change() {
        let ledger = Arc::new(InMemoryLedger::new());
        let artifact = ArtifactId::random();
        let ty = ArtifactTypeId::random();
        let tx_ty = TransactionTypeId::random();
        let (same, _) = ledger.append_transaction(artifact, ty, tx_ty, Some(100));
        let (changed, _) = ledger.append_transaction(artifact, ty, tx_ty, Some(101));
        let (stateless, _) = ledger.append_transaction(artifact, ty, tx_ty, None);

        let (handle, _rx, _) = handle_for(ledger.clone(), Reply::Advance);
        handle.set_criteria(
            Criteria::with_latest_block_id(BlockId::ROOT).for_artifact_state(artifact, 100),
        );

        assert!(!handle.is_triggered_by(&same).await.unwrap());
        assert!(handle.is_triggered_by(&changed).await.unwrap());
        assert!(!handle.is_triggered_by(&stateless).await.unwrap());
    }

    #[tokio::test]
    async fn state_criteria_surfaces_ledger_errors() {
        let ledger = Arc::new(InMemoryLedger::new());
        let artifact = ArtifactId::random();
        let (block, _) = ledger.append_transaction(
            artifact,
            ArtifactTypeId::random(),
            TransactionTypeId::random(),
            Some(5),
        );
        let (handle, _rx, _) = handle_for(ledger.clone(), Reply::Advance);
        handle.set_criteria(
            Criteria::with_latest_block_id(BlockId::ROOT).for_artifact_state(artifact, 1),
        );

        ledger.set_unavailable(Some("offline"));
        assert!(handle.is_triggered_by(&block).await.is_err());
    }

    #[tokio::test]
    async fn dispatch_applies_returned_criteria() {
        let ledger = Arc::new(InMemoryLedger::new());
        let block = ledger.append_block(Vec::new());
        let (handle, _rx, calls) = handle_for(ledger, Reply::Advance);

        assert_eq!(handle.dispatch(block.block_id).await, DispatchOutcome::Rearmed);
        assert_eq!(
            handle.criteria(),
            Criteria::with_latest_block_id(block.block_id)
        );
        assert_eq!(recorded(&calls).len(), 1);
    }

    #[tokio::test]
    async fn dispatch_keeps_criteria_when_sentinel_misbehaves() {
        for reply in [Reply::Fail, Reply::Panic, Reply::Invalid] {
            let ledger = Arc::new(InMemoryLedger::new());
            let block = ledger.append_block(Vec::new());
            let (handle, rx, _) = handle_for(ledger, reply);

            assert_eq!(handle.dispatch(block.block_id).await, DispatchOutcome::Failed);
            assert!(handle.is_active());
            assert_eq!(
                handle.criteria(),
                Criteria::with_latest_block_id(BlockId::ROOT)
            );
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn dispatch_opt_out_cancels() {
        let ledger = Arc::new(InMemoryLedger::new());
        let block = ledger.append_block(Vec::new());
        let (handle, rx, _) = handle_for(ledger, Reply::OptOut);

        assert_eq!(handle.dispatch(block.block_id).await, DispatchOutcome::OptedOut);
        assert!(!handle.is_active());
        assert_eq!(rx.try_iter().count(), 1);
    }
}
