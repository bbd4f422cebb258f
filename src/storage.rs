use std::sync::Arc;

// Re-export core storage types so the rest of the crate goes through crate::storage
pub use expensedb_core::storage::{StorageBackend, StorageError, StorageTransaction, TransactionId};
pub use expensedb_memory::InMemoryStorage;
pub use expensedb_postgres::PostgresStorage;
pub use expensedb_sqlite::SqliteStorage;

use crate::config::{StorageConfig, StorageKind};

/// Opens the backend selected by `config`. Blocking: connecting to
/// PostgreSQL must not happen on an async worker thread.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let storage: Arc<dyn StorageBackend> = match config.backend {
        StorageKind::Memory => Arc::new(InMemoryStorage::new()),
        StorageKind::Sqlite => Arc::new(SqliteStorage::new(&config.path)?),
        StorageKind::Postgres => {
            let url = config.url.as_deref().ok_or_else(|| {
                StorageError::Unavailable("storage.url is required for the postgres backend".to_string())
            })?;
            Arc::new(PostgresStorage::new(url)?)
        }
    };
    tracing::info!(backend = ?config.backend, "Storage opened");
    Ok(storage)
}
