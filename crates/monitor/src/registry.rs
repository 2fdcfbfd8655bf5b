//! Owned set of registrations and the block fan-out.
//!
//! Registrations are accepted only before `start()`. Handles cancel
//! themselves by posting an intent on a channel; the registry drains that
//! channel before every registration, fan-out and query, and drops only the
//! exact handle that asked to go.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use ledger_sentinel_domain::{Block, CriteriaError, Ledger, Settings};
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::handle::{CancelIntent, DispatchOutcome, RegistrationHandle};
use crate::poller::BlockNotifier;
use crate::sentinel::{Sentinel, SentinelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Active,
    Closed,
}

struct RegistryState {
    phase: Phase,
    handles: BTreeMap<String, RegistrationHandle>,
}

/// Per-block tally of what the fan-out did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifySummary {
    pub triggered: usize,
    pub rearmed: usize,
    pub opted_out: usize,
    pub failed: usize,
}

pub struct SentinelRegistry {
    state: Mutex<RegistryState>,
    cancel_tx: Sender<CancelIntent>,
    cancel_rx: Receiver<CancelIntent>,
}

impl Default for SentinelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelRegistry {
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = unbounded();
        Self {
            state: Mutex::new(RegistryState {
                phase: Phase::Idle,
                handles: BTreeMap::new(),
            }),
            cancel_tx,
            cancel_rx,
        }
    }

    /// Locks the state after applying every pending cancellation.
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        let mut state = self.state.lock().expect("mutex poisoned");
        for intent in self.cancel_rx.try_iter() {
            let matches = state
                .handles
                .get(&intent.name)
                .is_some_and(|handle| handle.id() == intent.handle_id);
            if matches {
                state.handles.remove(&intent.name);
                debug!(sentinel = %intent.name, "registration removed");
            }
        }
        state
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        sentinel: Box<dyn Sentinel>,
        settings: Settings,
        ledger: Arc<dyn Ledger>,
    ) -> Result<RegistrationHandle, RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let mut state = self.state();
        match state.phase {
            Phase::Idle => {}
            Phase::Active => return Err(RegistryError::AlreadyActive),
            Phase::Closed => return Err(RegistryError::Closed),
        }
        if state.handles.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let handle = RegistrationHandle::new(
            name.clone(),
            sentinel,
            settings,
            ledger,
            self.cancel_tx.clone(),
        );
        state.handles.insert(name.clone(), handle.clone());
        debug!(sentinel = %name, "sentinel registered");
        Ok(handle)
    }

    /// Collects each sentinel's initial criteria, then opens the registry
    /// for notifications. The first failing sentinel aborts the start.
    pub async fn start(&self) -> Result<(), RegistryError> {
        let handles = {
            let state = self.state();
            match state.phase {
                Phase::Idle => {}
                Phase::Active => return Err(RegistryError::AlreadyActive),
                Phase::Closed => return Err(RegistryError::Closed),
            }
            state.handles.values().cloned().collect::<Vec<_>>()
        };

        for handle in &handles {
            let name = handle.name().to_string();
            let initial = handle
                .start_sentinel()
                .await
                .map_err(|source| RegistryError::StartFailed {
                    name: name.clone(),
                    source,
                })?;
            let initial = initial
                .validate()
                .map_err(|source| RegistryError::InvalidCriteria { name, source })?;
            handle.set_criteria(initial);
        }

        self.state().phase = Phase::Active;
        info!(sentinels = handles.len(), "sentinel registry started");
        Ok(())
    }

    /// Hands `block` to every active registration it triggers. A failing
    /// sentinel is logged and keeps its criteria; the others are unaffected.
    pub async fn notify_block(&self, block: &Block) -> Result<NotifySummary, RegistryError> {
        let handles = {
            let state = self.state();
            if state.phase != Phase::Active {
                return Err(RegistryError::NotActive);
            }
            state.handles.values().cloned().collect::<Vec<_>>()
        };
        trace!(
            height = block.height,
            block_id = %block.block_id,
            registrations = handles.len(),
            "notify block"
        );

        let mut summary = NotifySummary::default();
        for handle in handles {
            if !handle.is_active() {
                continue;
            }
            match handle.is_triggered_by(block).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    counter!("sentinel_notifications_total", "result" => "ledger_error")
                        .increment(1);
                    warn!(
                        sentinel = handle.name(),
                        block_id = %block.block_id,
                        error = %err,
                        "could not evaluate criteria, skipping sentinel for this block"
                    );
                    continue;
                }
            }
            if !handle.is_active() {
                continue;
            }

            trace!(sentinel = handle.name(), "notifying sentinel");
            summary.triggered += 1;
            match handle.dispatch(block.block_id).await {
                DispatchOutcome::Rearmed => {
                    summary.rearmed += 1;
                    counter!("sentinel_notifications_total", "result" => "rearmed").increment(1);
                }
                DispatchOutcome::OptedOut => {
                    summary.opted_out += 1;
                    counter!("sentinel_notifications_total", "result" => "opted_out")
                        .increment(1);
                }
                DispatchOutcome::Failed => {
                    summary.failed += 1;
                    counter!("sentinel_notifications_total", "result" => "failed").increment(1);
                }
            }
        }

        Ok(summary)
    }

    /// Deactivates the registry and cancels every registration.
    pub fn close(&self) {
        let handles = {
            let mut state = self.state();
            state.phase = Phase::Closed;
            std::mem::take(&mut state.handles)
        };
        for handle in handles.values() {
            handle.cancel();
        }
        // drop the intents the cancels above just queued
        drop(self.state());
        debug!(cancelled = handles.len(), "sentinel registry closed");
    }

    /// Removes and cancels the registration called `name`.
    pub fn remove(&self, name: &str) -> Option<RegistrationHandle> {
        let handle = self.state().handles.remove(name)?;
        handle.cancel();
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.state().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.state().handles.keys().cloned().collect()
    }

    pub fn handle(&self, name: &str) -> Option<RegistrationHandle> {
        self.state().handles.get(name).cloned()
    }

    pub fn is_active(&self) -> bool {
        self.state().phase == Phase::Active
    }
}

#[async_trait]
impl BlockNotifier for SentinelRegistry {
    async fn notify_block(&self, block: &Block) -> Result<NotifySummary, RegistryError> {
        SentinelRegistry::notify_block(self, block).await
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("sentinel cannot be registered with an empty name")]
    EmptyName,
    #[error("sentinel registry is active")]
    AlreadyActive,
    #[error("sentinel registry is closed")]
    Closed,
    #[error("sentinel already registered with name `{0}`")]
    DuplicateName(String),
    #[error("sentinel registry is not active")]
    NotActive,
    #[error("sentinel `{name}` returned invalid criteria: {source}")]
    InvalidCriteria {
        name: String,
        #[source]
        source: CriteriaError,
    },
    #[error("sentinel `{name}` failed to start: {source}")]
    StartFailed {
        name: String,
        #[source]
        source: SentinelError,
    },
}
