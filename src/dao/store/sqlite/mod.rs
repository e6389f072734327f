//! SQLite persistence for rooms, memberships and saves.

mod config;
mod error;
mod rows;
mod schema;
mod store;

pub use config::SqliteConfig;
pub use error::{SqliteDaoError, SqliteResult};
pub use store::SqliteStore;

use crate::dao::storage::StorageError;

impl From<SqliteDaoError> for StorageError {
    fn from(err: SqliteDaoError) -> Self {
        match err {
            SqliteDaoError::Json { table, .. } | SqliteDaoError::InvalidValue { table, .. } => {
                StorageError::Corrupt {
                    table,
                    message: err.to_string(),
                }
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
