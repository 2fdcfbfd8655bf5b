use sea_orm::sea_query::{ColumnDef, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::sentinel_offset;
use ledger_sentinel_domain::storage::{StorageError, StorageResult};

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let offset_table = Table::create()
        .if_not_exists()
        .table(sentinel_offset::Entity)
        .col(
            ColumnDef::new(sentinel_offset::Column::Key)
                .string_len(64)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(sentinel_offset::Column::BlockId)
                .string_len(36)
                .not_null(),
        )
        .col(
            ColumnDef::new(sentinel_offset::Column::BlockHeight)
                .big_integer()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, offset_table).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
