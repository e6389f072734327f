use std::{str::FromStr, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};

use super::error::{SqliteDaoError, SqliteResult};

const DEFAULT_DATABASE_URL: &str = "sqlite://crossword.db?mode=rwc";
const DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// Runtime configuration describing how to open the SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub options: SqliteConnectOptions,
    pub max_connections: u32,
    /// Keep a single never-recycled connection; required for `:memory:` databases.
    pub pinned: bool,
}

impl SqliteConfig {
    /// Parse a `sqlite://` URL into connection options.
    pub fn from_url(url: &str) -> SqliteResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|source| SqliteDaoError::InvalidUrl {
                url: url.to_owned(),
                source,
            })?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        Ok(Self {
            options,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            pinned: false,
        })
    }

    /// Read `DATABASE_URL`, falling back to a file next to the working directory.
    pub fn from_env() -> SqliteResult<Self> {
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into());
        Self::from_url(&url)
    }

    /// Private in-memory database, mostly useful for tests.
    pub fn in_memory() -> Self {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap_or_else(|_| SqliteConnectOptions::new())
            .foreign_keys(true);

        Self {
            options,
            max_connections: 1,
            pinned: true,
        }
    }
}
