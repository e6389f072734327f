//! Error types shared by the SQLite storage implementation.

use thiserror::Error;

/// Convenient result alias returning [`SqliteDaoError`] failures.
pub type SqliteResult<T> = Result<T, SqliteDaoError>;

/// Failures that can occur while interacting with SQLite.
#[derive(Debug, Error)]
pub enum SqliteDaoError {
    /// The configured database URL could not be parsed.
    #[error("invalid SQLite database URL `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    /// Opening the connection pool failed.
    #[error("failed to open SQLite pool")]
    Connect {
        #[source]
        source: sqlx::Error,
    },
    /// Creating a table, index or trigger failed.
    #[error("failed to apply schema statement `{name}`")]
    Schema {
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },
    /// A statement against a table failed.
    #[error("failed to {action} in `{table}`")]
    Query {
        table: &'static str,
        action: &'static str,
        #[source]
        source: sqlx::Error,
    },
    /// A JSON column could not be encoded or decoded.
    #[error("invalid JSON in `{table}.{column}`")]
    Json {
        table: &'static str,
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// A stored value does not fit the entity model.
    #[error("invalid value in `{table}.{column}`: {message}")]
    InvalidValue {
        table: &'static str,
        column: &'static str,
        message: String,
    },
}

impl SqliteDaoError {
    pub(super) fn query(table: &'static str, action: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| SqliteDaoError::Query {
            table,
            action,
            source,
        }
    }
}

/// Constraint that rejected a write, recovered from the SQLite error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Violation {
    /// `rooms.code` is already used.
    RoomCode,
    /// `(room_id, user_id)` already present.
    Membership,
    /// `(room_id, color)` already present.
    MemberColor,
    /// The capacity trigger aborted the insert.
    Capacity,
    /// Foreign key to `rooms` failed.
    MissingRoom,
}

/// Classify a constraint failure; `None` for any other error.
pub(super) fn violation(err: &sqlx::Error) -> Option<Violation> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    let message = db_err.message();

    if message.contains(super::schema::ROOM_FULL_MESSAGE) {
        return Some(Violation::Capacity);
    }
    if db_err.is_foreign_key_violation() {
        return Some(Violation::MissingRoom);
    }
    if !db_err.is_unique_violation() {
        return None;
    }
    if message.contains("room_members.color") {
        Some(Violation::MemberColor)
    } else if message.contains("room_members.user_id") {
        Some(Violation::Membership)
    } else if message.contains("rooms.code") {
        Some(Violation::RoomCode)
    } else {
        None
    }
}
