//! Host-facing assembly: builds sentinels from properties, wires the
//! registry, offset store and poller together, and runs the polling worker
//! on the tokio runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ledger_sentinel_domain::{
    config::BootstrapConfig,
    services::telemetry::{init_telemetry, TelemetryConfig},
    Ledger, OffsetStore, Properties, SentinelConfigError, SettingValue,
};
use ledger_sentinel_storage::{FileSystemOffsetStore, SeaOrmStorage};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::handle::RegistrationHandle;
use crate::poller::SentinelPollerTask;
use crate::registry::SentinelRegistry;
use crate::sentinel::Sentinel;
use crate::worker::{run_poller, MonitorError};

const SENTINEL_PREFIX: &str = "sentinel.";

type SentinelFactory = Box<dyn Fn() -> Box<dyn Sentinel> + Send + Sync>;

/// Sentinel kinds a container can instantiate by name.
#[derive(Default)]
pub struct SentinelCatalog {
    factories: BTreeMap<String, SentinelFactory>,
}

impl SentinelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Sentinel> + Send + Sync + 'static,
    {
        self.insert(kind, factory);
        self
    }

    pub fn insert<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Sentinel> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, kind: &str) -> Option<Box<dyn Sentinel>> {
        self.factories.get(kind).map(|factory| factory())
    }
}

impl fmt::Debug for SentinelCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.kinds()).finish()
    }
}

struct RunningPoller {
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<Result<(), MonitorError>>,
}

pub struct SentinelContainer {
    ledger: Arc<dyn Ledger>,
    offsets: Arc<dyn OffsetStore>,
    catalog: SentinelCatalog,
    registry: Arc<SentinelRegistry>,
    poll_interval: Duration,
    running: Option<RunningPoller>,
}

impl SentinelContainer {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        offsets: Arc<dyn OffsetStore>,
        catalog: SentinelCatalog,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            offsets,
            catalog,
            registry: Arc::new(SentinelRegistry::new()),
            poll_interval,
            running: None,
        }
    }

    /// Uses the database offset store when a database URL is configured and
    /// the offset file otherwise.
    pub async fn from_config(
        config: &BootstrapConfig,
        ledger: Arc<dyn Ledger>,
        catalog: SentinelCatalog,
    ) -> Result<Self, MonitorError> {
        let offsets: Arc<dyn OffsetStore> = match config.database_url() {
            Some(url) => Arc::new(SeaOrmStorage::connect(url).await?),
            None => Arc::new(FileSystemOffsetStore::new(config.offset_path())),
        };
        Ok(Self::new(ledger, offsets, catalog, config.poll_interval()))
    }

    /// Loads configuration from the environment, installs telemetry, and
    /// registers every sentinel named in the properties file. The returned
    /// container is not started yet.
    pub async fn bootstrap(
        ledger: Arc<dyn Ledger>,
        catalog: SentinelCatalog,
    ) -> Result<Self, MonitorError> {
        let config = BootstrapConfig::load_from_env()?;
        init_telemetry(&TelemetryConfig::from_env("SENTINEL"))?;
        let properties = Properties::load(config.properties_path())?;

        let container = Self::from_config(&config, ledger, catalog).await?;
        let handles = container.register_all(&properties)?;
        info!(
            sentinels = handles.len(),
            properties = %config.properties_path().display(),
            "sentinels configured"
        );
        Ok(container)
    }

    pub fn registry(&self) -> &Arc<SentinelRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Registers the sentinel whose kind is named by `sentinel.<name>`,
    /// configured from the `sentinel.<name>.*` properties.
    pub fn register(
        &self,
        name: &str,
        properties: &Properties,
    ) -> Result<RegistrationHandle, MonitorError> {
        let key = format!("{SENTINEL_PREFIX}{name}");
        let kind = properties
            .get(&key)
            .map(str::trim)
            .filter(|kind| !kind.is_empty())
            .ok_or_else(|| SentinelConfigError::MissingProperty(key.clone()))?;
        let sentinel = self
            .catalog
            .create(kind)
            .ok_or_else(|| SentinelConfigError::UnknownClass {
                name: key.clone(),
                kind: kind.to_string(),
            })?;

        let settings = sentinel.config().map_to_settings(name, properties)?;
        for (setting, value) in settings.iter() {
            if let SettingValue::Class(referenced) = value {
                if !self.catalog.contains(referenced) {
                    return Err(SentinelConfigError::UnknownClass {
                        name: format!("{key}.{setting}"),
                        kind: referenced.clone(),
                    }
                    .into());
                }
            }
        }

        let handle = self
            .registry
            .register(name, sentinel, settings, self.ledger.clone())?;
        info!(sentinel = name, kind, "created sentinel");
        Ok(handle)
    }

    /// Registers one sentinel per `sentinel.<name>` property.
    pub fn register_all(
        &self,
        properties: &Properties,
    ) -> Result<Vec<RegistrationHandle>, MonitorError> {
        properties
            .keys()
            .filter_map(sentinel_name)
            .map(|name| self.register(name, properties))
            .collect()
    }

    /// Starts every sentinel, catches the poller up with the recorded offset
    /// and spawns the polling worker.
    pub async fn start(&mut self) -> Result<(), MonitorError> {
        self.registry.start().await?;
        let poller = SentinelPollerTask::new(
            self.ledger.clone(),
            self.offsets.clone(),
            self.registry.clone(),
        )
        .await?;

        let (shutdown, signal) = watch::channel(false);
        let worker = tokio::spawn(run_poller(poller, self.poll_interval, signal));
        self.running = Some(RunningPoller { shutdown, worker });
        info!(
            sentinels = self.registry.len(),
            poll_millis = self.poll_interval.as_millis() as u64,
            "sentinels started"
        );
        Ok(())
    }

    /// Stops the worker, closes the registry, and reports how the worker
    /// ended.
    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        let outcome = match self.running.take() {
            Some(running) => {
                if running.shutdown.send(true).is_err() {
                    debug!("poller already finished");
                }
                match running.worker.await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(error = %err, "poller task did not finish cleanly");
                        Err(MonitorError::Worker(err.to_string()))
                    }
                }
            }
            None => Ok(()),
        };

        self.registry.close();
        debug!("sentinel container closed");
        outcome
    }
}

/// `sentinel.<name>` with a single `[A-Za-z0-9_-]` segment.
fn sentinel_name(key: &str) -> Option<&str> {
    let name = key.strip_prefix(SENTINEL_PREFIX)?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then_some(name)
}
