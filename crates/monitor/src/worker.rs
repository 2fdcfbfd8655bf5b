use std::time::Duration;

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use ledger_sentinel_domain::{
    config::ConfigError, services::telemetry::TelemetryError, SentinelConfigError, StorageError,
};

use crate::poller::{PollerError, SentinelPollerTask};
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("sentinel config error: {0}")]
    SentinelConfig(#[from] SentinelConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("poller error: {0}")]
    Poller(#[from] PollerError),
    #[error("poller task failed: {0}")]
    Worker(String),
}

/// Drives `poller` every `poll_interval` until `shutdown` flips to `true` or
/// its sender goes away. A ledger failure only skips the current cycle; an
/// offset write failure ends the loop since progress can no longer be
/// recorded.
pub async fn run_poller(
    mut poller: SentinelPollerTask,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), MonitorError> {
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => poll_once(&mut poller).await?,
        }
    }

    debug!("sentinel poller stopped");
    Ok(())
}

async fn poll_once(poller: &mut SentinelPollerTask) -> Result<(), MonitorError> {
    match poller.process_latest_blocks().await {
        Ok(blocks) => {
            counter!("sentinel_poll_cycles_total", "result" => "ok").increment(1);
            histogram!("sentinel_poll_blocks").record(blocks as f64);
            Ok(())
        }
        Err(PollerError::Ledger(err)) => {
            counter!("sentinel_poll_cycles_total", "result" => "ledger_error").increment(1);
            warn!(error = %err, "ledger query failed, retrying on next tick");
            Ok(())
        }
        Err(err) => {
            counter!("sentinel_poll_cycles_total", "result" => "storage_error").increment(1);
            error!(error = %err, "cannot record sentinel progress, stopping poller");
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::registry::SentinelRegistry;
    use crate::testing::{recorded, Calls, Reply, ScriptedSentinel};
    use ledger_sentinel_domain::{InMemoryLedger, Settings};
    use ledger_sentinel_storage::FileSystemOffsetStore;
    use tempfile::tempdir;
    use tokio::time::sleep;

    const TICK: Duration = Duration::from_millis(10);

    async fn started_registry(ledger: Arc<InMemoryLedger>) -> (Arc<SentinelRegistry>, Calls) {
        let registry = Arc::new(SentinelRegistry::new());
        let (sentinel, calls) = ScriptedSentinel::new(Reply::Advance);
        registry
            .register("worker", sentinel.boxed(), Settings::new(), ledger)
            .unwrap();
        registry.start().await.unwrap();
        (registry, calls)
    }

    async fn wait_for_calls(calls: &Calls, expected: usize) {
        for _ in 0..200 {
            if recorded(calls).len() >= expected {
                return;
            }
            sleep(TICK).await;
        }
    }

    #[tokio::test]
    async fn polls_through_ledger_outages_until_shutdown() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.append_block(Vec::new());
        ledger.append_block(Vec::new());
        let (registry, calls) = started_registry(ledger.clone()).await;
        let offsets = Arc::new(FileSystemOffsetStore::new(dir.path().join("sentinel.log")));
        let poller = SentinelPollerTask::new(ledger.clone(), offsets, registry)
            .await
            .unwrap();

        ledger.set_unavailable(Some("agent restarting"));
        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(run_poller(poller, TICK, rx));

        sleep(TICK * 5).await;
        assert!(recorded(&calls).is_empty());
        assert!(!worker.is_finished());

        ledger.set_unavailable(None);
        wait_for_calls(&calls, 2).await;
        tx.send(true).unwrap();
        worker.await.unwrap().unwrap();

        assert_eq!(recorded(&calls).len(), 2);
    }

    #[tokio::test]
    async fn dropped_sender_stops_the_loop() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let (registry, _) = started_registry(ledger.clone()).await;
        let offsets = Arc::new(FileSystemOffsetStore::new(dir.path().join("sentinel.log")));
        let poller = SentinelPollerTask::new(ledger, offsets, registry)
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(run_poller(poller, TICK, rx));
        drop(tx);
        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn offset_failure_ends_the_loop() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let (registry, _) = started_registry(ledger.clone()).await;
        let offsets = Arc::new(FileSystemOffsetStore::new(dir.path().join("sentinel.log")));
        let poller = SentinelPollerTask::new(ledger.clone(), offsets, registry)
            .await
            .unwrap();

        // the offset log disappears with its directory
        drop(dir);
        ledger.append_block(Vec::new());

        let (_tx, rx) = watch::channel(false);
        let result = run_poller(poller, TICK, rx).await;
        assert!(matches!(
            result,
            Err(MonitorError::Poller(PollerError::Storage(StorageError::Io(_))))
        ));
    }
}
