//! Offset store adapters that satisfy the domain `OffsetStore` contract: a
//! single JSON file on the local filesystem (the default for one poller per
//! host) and a SeaORM-backed table for hosts that already keep their state in
//! a database (SQLite by default, PostgreSQL via feature flag).

mod entity;
mod file_store;
mod migration;
mod offset_store;

use std::sync::Arc;

use ledger_sentinel_domain::storage::{StorageError, StorageResult};
use migration::run_migrations;
use sea_orm::{Database, DatabaseConnection};

pub use file_store::FileSystemOffsetStore;

/// Shared database handle backing the SeaORM offset store.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let db = Database::connect(database_url)
            .await
            .map_err(StorageError::from_source)?;
        run_migrations(&db).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}
