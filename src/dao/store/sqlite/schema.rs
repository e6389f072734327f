use sqlx::SqlitePool;

use super::error::{SqliteDaoError, SqliteResult};

/// Message raised by the capacity trigger.
pub(super) const ROOM_FULL_MESSAGE: &str = "room_full";

const STATEMENTS: &[(&str, &str)] = &[
    (
        "rooms",
        r#"
        CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY NOT NULL,
            code TEXT NOT NULL UNIQUE,
            puzzle_id TEXT NOT NULL,
            puzzle_data TEXT NOT NULL,
            created_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            expires_at INTEGER,
            max_members INTEGER NOT NULL CHECK (max_members > 0),
            user_grid TEXT NOT NULL DEFAULT '[]',
            checked_cells TEXT NOT NULL DEFAULT '[]',
            accumulated_seconds INTEGER NOT NULL DEFAULT 0 CHECK (accumulated_seconds >= 0),
            timer_started_at INTEGER,
            is_complete INTEGER NOT NULL DEFAULT 0,
            is_paused INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "room_members",
        r#"
        CREATE TABLE IF NOT EXISTS room_members (
            room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            color TEXT NOT NULL,
            display_name TEXT NOT NULL,
            joined_at INTEGER NOT NULL,
            PRIMARY KEY (room_id, user_id),
            UNIQUE (room_id, color)
        )
        "#,
    ),
    (
        "room_members_capacity",
        r#"
        CREATE TRIGGER IF NOT EXISTS room_members_capacity
        BEFORE INSERT ON room_members
        WHEN (SELECT COUNT(*) FROM room_members WHERE room_id = NEW.room_id)
            >= (SELECT max_members FROM rooms WHERE id = NEW.room_id)
        BEGIN
            SELECT RAISE(ABORT, 'room_full');
        END
        "#,
    ),
    (
        "rooms_expires_at_idx",
        "CREATE INDEX IF NOT EXISTS rooms_expires_at_idx ON rooms (expires_at)",
    ),
    (
        "saves",
        r#"
        CREATE TABLE IF NOT EXISTS saves (
            user_id TEXT NOT NULL,
            puzzle_id TEXT NOT NULL,
            user_grid TEXT NOT NULL DEFAULT '[]',
            checked_cells TEXT NOT NULL DEFAULT '[]',
            elapsed_seconds INTEGER NOT NULL DEFAULT 0,
            is_complete INTEGER NOT NULL DEFAULT 0,
            cells_filled INTEGER NOT NULL DEFAULT 0,
            total_cells INTEGER NOT NULL DEFAULT 0,
            completion_pct INTEGER NOT NULL DEFAULT 0,
            puzzle_date TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, puzzle_id)
        )
        "#,
    ),
];

/// Create tables, constraints and triggers when they are missing.
pub(super) async fn ensure_schema(pool: &SqlitePool) -> SqliteResult<()> {
    for (name, statement) in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|source| SqliteDaoError::Schema { name, source })?;
    }
    Ok(())
}
