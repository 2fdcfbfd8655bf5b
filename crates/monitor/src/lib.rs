//! Sentinel notification runtime: observers register criteria with a
//! [`SentinelRegistry`], a [`SentinelPollerTask`] drains new ledger blocks
//! into it, and an offset store makes sure each block is announced once
//! across restarts. [`SentinelContainer`] assembles the pieces for a host
//! process and drives the poller on a tokio interval.

pub mod container;
pub mod handle;
pub mod helper;
pub mod poller;
pub mod registry;
pub mod sentinel;
pub mod worker;

#[cfg(test)]
mod testing;

pub use container::{SentinelCatalog, SentinelContainer};
pub use handle::{RegistrationHandle, RegistrationStatus};
pub use helper::{BlockchainSentinelHelper, QueryResult};
pub use poller::{BlockNotifier, PollerError, SentinelPollerTask};
pub use registry::{NotifySummary, RegistryError, SentinelRegistry};
pub use sentinel::{Sentinel, SentinelError};
pub use worker::{run_poller, MonitorError};
