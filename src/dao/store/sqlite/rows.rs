//! Row shapes read from SQLite and their conversion into entities.

use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::{SqliteDaoError, SqliteResult};
use crate::dao::models::{RoomEntity, RoomMemberEntity, SaveEntity, SharedStateEntity};

pub(super) const ROOMS: &str = "rooms";
pub(super) const ROOM_MEMBERS: &str = "room_members";
pub(super) const SAVES: &str = "saves";

pub(super) const ROOM_COLUMNS: &str = "id, code, puzzle_id, puzzle_data, created_by, created_at, \
     updated_at, expires_at, max_members, user_grid, checked_cells, accumulated_seconds, \
     timer_started_at, is_complete, is_paused";
pub(super) const MEMBER_COLUMNS: &str = "room_id, user_id, color, display_name, joined_at";
pub(super) const SAVE_COLUMNS: &str = "user_id, puzzle_id, user_grid, checked_cells, \
     elapsed_seconds, is_complete, cells_filled, total_cells, completion_pct, puzzle_date, \
     created_at, updated_at";

/// Timestamps are persisted as Unix milliseconds so they compare numerically in SQL.
pub(super) fn to_millis(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(table: &'static str, column: &'static str, millis: i64) -> SqliteResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).map_err(|err| {
        SqliteDaoError::InvalidValue {
            table,
            column,
            message: err.to_string(),
        }
    })
}

fn parse_uuid(table: &'static str, column: &'static str, value: &str) -> SqliteResult<Uuid> {
    Uuid::parse_str(value).map_err(|err| SqliteDaoError::InvalidValue {
        table,
        column,
        message: err.to_string(),
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(
    table: &'static str,
    column: &'static str,
    text: &str,
) -> SqliteResult<T> {
    serde_json::from_str(text).map_err(|source| SqliteDaoError::Json {
        table,
        column,
        source,
    })
}

pub(super) fn encode_json(
    table: &'static str,
    column: &'static str,
    value: &impl Serialize,
) -> SqliteResult<String> {
    serde_json::to_string(value).map_err(|source| SqliteDaoError::Json {
        table,
        column,
        source,
    })
}

#[derive(Debug, FromRow)]
pub(super) struct RoomRow {
    id: String,
    code: String,
    puzzle_id: String,
    puzzle_data: String,
    created_by: String,
    created_at: i64,
    updated_at: i64,
    expires_at: Option<i64>,
    max_members: i64,
    user_grid: String,
    checked_cells: String,
    accumulated_seconds: i64,
    timer_started_at: Option<i64>,
    is_complete: bool,
    is_paused: bool,
}

impl TryFrom<RoomRow> for RoomEntity {
    type Error = SqliteDaoError;

    fn try_from(row: RoomRow) -> Result<Self, Self::Error> {
        let max_members =
            u8::try_from(row.max_members).map_err(|err| SqliteDaoError::InvalidValue {
                table: ROOMS,
                column: "max_members",
                message: err.to_string(),
            })?;

        Ok(Self {
            id: parse_uuid(ROOMS, "id", &row.id)?,
            code: row.code,
            puzzle_id: row.puzzle_id,
            puzzle_data: parse_json::<Value>(ROOMS, "puzzle_data", &row.puzzle_data)?,
            created_by: parse_uuid(ROOMS, "created_by", &row.created_by)?,
            created_at: from_millis(ROOMS, "created_at", row.created_at)?,
            updated_at: from_millis(ROOMS, "updated_at", row.updated_at)?,
            expires_at: row
                .expires_at
                .map(|millis| from_millis(ROOMS, "expires_at", millis))
                .transpose()?,
            max_members,
            state: SharedStateEntity {
                user_grid: parse_json(ROOMS, "user_grid", &row.user_grid)?,
                checked_cells: parse_json(ROOMS, "checked_cells", &row.checked_cells)?,
                accumulated_seconds: row.accumulated_seconds,
                timer_started_at: row
                    .timer_started_at
                    .map(|millis| from_millis(ROOMS, "timer_started_at", millis))
                    .transpose()?,
                is_complete: row.is_complete,
                is_paused: row.is_paused,
            },
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct MemberRow {
    room_id: String,
    user_id: String,
    color: String,
    display_name: String,
    joined_at: i64,
}

impl TryFrom<MemberRow> for RoomMemberEntity {
    type Error = SqliteDaoError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(Self {
            room_id: parse_uuid(ROOM_MEMBERS, "room_id", &row.room_id)?,
            user_id: parse_uuid(ROOM_MEMBERS, "user_id", &row.user_id)?,
            color: row.color,
            display_name: row.display_name,
            joined_at: from_millis(ROOM_MEMBERS, "joined_at", row.joined_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct SaveRow {
    user_id: String,
    puzzle_id: String,
    user_grid: String,
    checked_cells: String,
    elapsed_seconds: i64,
    is_complete: bool,
    cells_filled: i64,
    total_cells: i64,
    completion_pct: i64,
    puzzle_date: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SaveRow> for SaveEntity {
    type Error = SqliteDaoError;

    fn try_from(row: SaveRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: parse_uuid(SAVES, "user_id", &row.user_id)?,
            puzzle_id: row.puzzle_id,
            user_grid: parse_json(SAVES, "user_grid", &row.user_grid)?,
            checked_cells: parse_json(SAVES, "checked_cells", &row.checked_cells)?,
            elapsed_seconds: row.elapsed_seconds,
            is_complete: row.is_complete,
            cells_filled: row.cells_filled,
            total_cells: row.total_cells,
            completion_pct: row.completion_pct,
            puzzle_date: row.puzzle_date,
            created_at: from_millis(SAVES, "created_at", row.created_at)?,
            updated_at: from_millis(SAVES, "updated_at", row.updated_at)?,
        })
    }
}
