use std::sync::Arc;

pub use cashbook_core::storage::{StorageBackend, StorageError, Table};
pub use cashbook_memory::InMemoryStorage;
pub use cashbook_postgres::PostgresStorage;
pub use cashbook_sqlite::SqliteStorage;

use crate::config::{BackendKind, StorageConfig};

/// Opens the configured backend. Call outside the async runtime; the
/// PostgreSQL client blocks on its own.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let storage: Arc<dyn StorageBackend> = match config.backend {
        BackendKind::Memory => Arc::new(InMemoryStorage::new()),
        BackendKind::Sqlite => Arc::new(SqliteStorage::new(&config.path)?),
        BackendKind::Postgres => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| StorageError::Other("storage.url is required for the postgres backend".to_string()))?;
            Arc::new(PostgresStorage::new(url)?)
        }
    };
    tracing::info!(backend = storage.backend_name(), "Storage opened");
    Ok(storage)
}
