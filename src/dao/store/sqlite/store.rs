use futures::future::BoxFuture;
use serde_json::Value;
use sqlx::{
    QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction, sqlite::SqlitePoolOptions,
};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{
    config::SqliteConfig,
    error::{SqliteDaoError, SqliteResult, Violation, violation},
    rows::{
        MEMBER_COLUMNS, MemberRow, ROOM_COLUMNS, ROOM_MEMBERS, ROOMS, RoomRow, SAVE_COLUMNS, SAVES,
        SaveRow, encode_json, to_millis,
    },
    schema::ensure_schema,
};
use crate::dao::{
    models::{
        AddMemberOutcome, ColorChangeOutcome, InsertRoomOutcome, RoomAggregate, RoomEntity,
        RoomMemberEntity, RoomStatePatch, SaveEntity,
    },
    storage::StorageResult,
    store::CrosswordStore,
};

/// SQLite-backed implementation of [`CrosswordStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the pool and make sure the schema exists.
    pub async fn connect(config: SqliteConfig) -> SqliteResult<Self> {
        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.pinned {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(config.options)
            .await
            .map_err(|source| SqliteDaoError::Connect { source })?;

        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Transaction holding the write lock from its first statement.
    ///
    /// A deferred transaction that reads before writing cannot upgrade its lock while
    /// another writer is pending, and SQLite fails it with `SQLITE_BUSY` instead of
    /// waiting out the busy timeout.
    async fn begin_write(
        &self,
        table: &'static str,
        action: &'static str,
    ) -> SqliteResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(SqliteDaoError::query(table, action))
    }

    async fn ping(&self) -> SqliteResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(SqliteDaoError::query(ROOMS, "ping"))?;
        Ok(())
    }

    async fn live_code_exists(&self, code: &str, now: OffsetDateTime) -> SqliteResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM rooms WHERE code = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(code)
        .bind(to_millis(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(SqliteDaoError::query(ROOMS, "look up room code"))?;

        Ok(row.is_some())
    }

    async fn insert_room(
        &self,
        room: RoomEntity,
        creator: RoomMemberEntity,
    ) -> SqliteResult<InsertRoomOutcome> {
        let puzzle_data = encode_json(ROOMS, "puzzle_data", &room.puzzle_data)?;
        let user_grid = encode_json(ROOMS, "user_grid", &room.state.user_grid)?;
        let checked_cells = encode_json(ROOMS, "checked_cells", &room.state.checked_cells)?;

        let mut tx = self.begin_write(ROOMS, "begin room insert").await?;

        // An expired room keeps its row until purged; free its code for reuse.
        let reclaimed = sqlx::query(
            "DELETE FROM rooms WHERE code = ? AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(&room.code)
        .bind(to_millis(room.created_at))
        .execute(&mut *tx)
        .await
        .map_err(SqliteDaoError::query(ROOMS, "reclaim expired code"))?;
        if reclaimed.rows_affected() > 0 {
            debug!(code = %room.code, "reclaimed code from expired room");
        }

        let inserted = sqlx::query(&format!(
            "INSERT INTO rooms ({ROOM_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(room.id.to_string())
        .bind(&room.code)
        .bind(&room.puzzle_id)
        .bind(puzzle_data)
        .bind(room.created_by.to_string())
        .bind(to_millis(room.created_at))
        .bind(to_millis(room.updated_at))
        .bind(room.expires_at.map(to_millis))
        .bind(i64::from(room.max_members))
        .bind(user_grid)
        .bind(checked_cells)
        .bind(room.state.accumulated_seconds)
        .bind(room.state.timer_started_at.map(to_millis))
        .bind(room.state.is_complete)
        .bind(room.state.is_paused)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(err) if violation(&err) == Some(Violation::RoomCode) => {
                return Ok(InsertRoomOutcome::CodeTaken);
            }
            Err(source) => {
                return Err(SqliteDaoError::Query {
                    table: ROOMS,
                    action: "insert room",
                    source,
                });
            }
        }

        insert_member(&mut tx, &creator)
            .await
            .map_err(SqliteDaoError::query(ROOM_MEMBERS, "insert creator"))?;

        tx.commit()
            .await
            .map_err(SqliteDaoError::query(ROOMS, "commit room insert"))?;

        Ok(InsertRoomOutcome::Inserted)
    }

    async fn find_room(&self, code: &str) -> SqliteResult<Option<RoomAggregate>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(SqliteDaoError::query(ROOMS, "begin room read"))?;

        let row: Option<RoomRow> =
            sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE code = ?"))
                .bind(code)
                .fetch_optional(&mut *tx)
                .await
                .map_err(SqliteDaoError::query(ROOMS, "load room"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let room = RoomEntity::try_from(row)?;

        let member_rows: Vec<MemberRow> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS} FROM room_members WHERE room_id = ? ORDER BY joined_at, rowid"
        ))
        .bind(room.id.to_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(SqliteDaoError::query(ROOM_MEMBERS, "load members"))?;

        tx.commit()
            .await
            .map_err(SqliteDaoError::query(ROOMS, "end room read"))?;

        let members = member_rows
            .into_iter()
            .map(RoomMemberEntity::try_from)
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(Some(RoomAggregate { room, members }))
    }

    async fn add_member(&self, member: RoomMemberEntity) -> SqliteResult<AddMemberOutcome> {
        let mut tx = self.begin_write(ROOM_MEMBERS, "begin join").await?;

        if let Some(existing) = find_member(&mut tx, member.room_id, member.user_id).await? {
            return Ok(AddMemberOutcome::AlreadyMember(existing));
        }

        match insert_member(&mut tx, &member).await {
            Ok(()) => {}
            Err(err) => {
                return match violation(&err) {
                    Some(Violation::MemberColor) => Ok(AddMemberOutcome::ColorTaken),
                    Some(Violation::Capacity) => Ok(AddMemberOutcome::Full),
                    Some(Violation::MissingRoom) => Ok(AddMemberOutcome::RoomMissing),
                    Some(Violation::Membership) => {
                        match find_member(&mut tx, member.room_id, member.user_id).await? {
                            Some(existing) => Ok(AddMemberOutcome::AlreadyMember(existing)),
                            None => Err(SqliteDaoError::Query {
                                table: ROOM_MEMBERS,
                                action: "insert member",
                                source: err,
                            }),
                        }
                    }
                    _ => Err(SqliteDaoError::Query {
                        table: ROOM_MEMBERS,
                        action: "insert member",
                        source: err,
                    }),
                };
            }
        }

        tx.commit()
            .await
            .map_err(SqliteDaoError::query(ROOM_MEMBERS, "commit join"))?;

        Ok(AddMemberOutcome::Added(member))
    }

    async fn remove_member(&self, code: &str, user_id: Uuid) -> SqliteResult<bool> {
        let result = sqlx::query(
            "DELETE FROM room_members \
             WHERE user_id = ? AND room_id = (SELECT id FROM rooms WHERE code = ?)",
        )
        .bind(user_id.to_string())
        .bind(code)
        .execute(&self.pool)
        .await
        .map_err(SqliteDaoError::query(ROOM_MEMBERS, "delete member"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_member_color(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        color: &str,
    ) -> SqliteResult<ColorChangeOutcome> {
        let mut tx = self
            .begin_write(ROOM_MEMBERS, "begin color change")
            .await?;

        let updated =
            sqlx::query("UPDATE room_members SET color = ? WHERE room_id = ? AND user_id = ?")
                .bind(color)
                .bind(room_id.to_string())
                .bind(user_id.to_string())
                .execute(&mut *tx)
                .await;

        let updated = match updated {
            Ok(result) => result,
            Err(err) if violation(&err) == Some(Violation::MemberColor) => {
                return Ok(ColorChangeOutcome::Taken);
            }
            Err(source) => {
                return Err(SqliteDaoError::Query {
                    table: ROOM_MEMBERS,
                    action: "update color",
                    source,
                });
            }
        };

        if updated.rows_affected() == 0 {
            return Ok(ColorChangeOutcome::NotMember);
        }

        let member = find_member(&mut tx, room_id, user_id).await?;
        tx.commit()
            .await
            .map_err(SqliteDaoError::query(ROOM_MEMBERS, "commit color change"))?;

        Ok(member.map_or(ColorChangeOutcome::NotMember, ColorChangeOutcome::Updated))
    }

    async fn is_member(&self, code: &str, user_id: Uuid) -> SqliteResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM room_members m JOIN rooms r ON r.id = m.room_id \
             WHERE r.code = ? AND m.user_id = ?",
        )
        .bind(code)
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(SqliteDaoError::query(ROOM_MEMBERS, "check membership"))?;

        Ok(row.is_some())
    }

    async fn apply_state_patch(
        &self,
        code: &str,
        patch: RoomStatePatch,
        now: OffsetDateTime,
    ) -> SqliteResult<bool> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE rooms SET updated_at = ");
        builder.push_bind(to_millis(now));

        if let Some(user_grid) = &patch.user_grid {
            builder
                .push(", user_grid = ")
                .push_bind(encode_json(ROOMS, "user_grid", user_grid)?);
        }
        if let Some(checked_cells) = &patch.checked_cells {
            builder
                .push(", checked_cells = ")
                .push_bind(encode_json(ROOMS, "checked_cells", checked_cells)?);
        }
        if let Some(seconds) = patch.accumulated_seconds {
            builder.push(", accumulated_seconds = ").push_bind(seconds);
        }
        if let Some(started_at) = patch.timer_started_at {
            builder
                .push(", timer_started_at = ")
                .push_bind(started_at.map(to_millis));
        }
        if let Some(is_complete) = patch.is_complete {
            builder.push(", is_complete = ").push_bind(is_complete);
        }
        if let Some(is_paused) = patch.is_paused {
            builder.push(", is_paused = ").push_bind(is_paused);
        }
        builder.push(" WHERE code = ").push_bind(code.to_owned());

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(SqliteDaoError::query(ROOMS, "update shared state"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_puzzle(
        &self,
        code: &str,
        puzzle_id: &str,
        puzzle_data: &Value,
        now: OffsetDateTime,
    ) -> SqliteResult<bool> {
        let puzzle_data = encode_json(ROOMS, "puzzle_data", puzzle_data)?;
        let result = sqlx::query(
            "UPDATE rooms SET puzzle_id = ?, puzzle_data = ?, updated_at = ?, \
             user_grid = '[]', checked_cells = '[]', accumulated_seconds = 0, \
             timer_started_at = NULL, is_complete = 0, is_paused = 0 \
             WHERE code = ?",
        )
        .bind(puzzle_id)
        .bind(puzzle_data)
        .bind(to_millis(now))
        .bind(code)
        .execute(&self.pool)
        .await
        .map_err(SqliteDaoError::query(ROOMS, "switch puzzle"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, cutoff: OffsetDateTime) -> SqliteResult<u64> {
        let result =
            sqlx::query("DELETE FROM rooms WHERE expires_at IS NOT NULL AND expires_at < ?")
                .bind(to_millis(cutoff))
                .execute(&self.pool)
                .await
                .map_err(SqliteDaoError::query(ROOMS, "purge expired rooms"))?;

        Ok(result.rows_affected())
    }

    async fn list_saves(&self, user_id: Uuid) -> SqliteResult<Vec<SaveEntity>> {
        let rows: Vec<SaveRow> = sqlx::query_as(&format!(
            "SELECT {SAVE_COLUMNS} FROM saves WHERE user_id = ? ORDER BY updated_at DESC"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(SqliteDaoError::query(SAVES, "list saves"))?;

        rows.into_iter().map(SaveEntity::try_from).collect()
    }

    async fn find_save(&self, user_id: Uuid, puzzle_id: &str) -> SqliteResult<Option<SaveEntity>> {
        let row: Option<SaveRow> = sqlx::query_as(&format!(
            "SELECT {SAVE_COLUMNS} FROM saves WHERE user_id = ? AND puzzle_id = ?"
        ))
        .bind(user_id.to_string())
        .bind(puzzle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SqliteDaoError::query(SAVES, "load save"))?;

        row.map(SaveEntity::try_from).transpose()
    }

    async fn upsert_save(&self, save: SaveEntity) -> SqliteResult<()> {
        let user_grid = encode_json(SAVES, "user_grid", &save.user_grid)?;
        let checked_cells = encode_json(SAVES, "checked_cells", &save.checked_cells)?;

        sqlx::query(&format!(
            "INSERT INTO saves ({SAVE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (user_id, puzzle_id) DO UPDATE SET \
             user_grid = excluded.user_grid, checked_cells = excluded.checked_cells, \
             elapsed_seconds = excluded.elapsed_seconds, is_complete = excluded.is_complete, \
             cells_filled = excluded.cells_filled, total_cells = excluded.total_cells, \
             completion_pct = excluded.completion_pct, puzzle_date = excluded.puzzle_date, \
             updated_at = excluded.updated_at"
        ))
        .bind(save.user_id.to_string())
        .bind(&save.puzzle_id)
        .bind(user_grid)
        .bind(checked_cells)
        .bind(save.elapsed_seconds)
        .bind(save.is_complete)
        .bind(save.cells_filled)
        .bind(save.total_cells)
        .bind(save.completion_pct)
        .bind(&save.puzzle_date)
        .bind(to_millis(save.created_at))
        .bind(to_millis(save.updated_at))
        .execute(&self.pool)
        .await
        .map_err(SqliteDaoError::query(SAVES, "upsert save"))?;

        Ok(())
    }

    async fn delete_save(&self, user_id: Uuid, puzzle_id: &str) -> SqliteResult<bool> {
        let result = sqlx::query("DELETE FROM saves WHERE user_id = ? AND puzzle_id = ?")
            .bind(user_id.to_string())
            .bind(puzzle_id)
            .execute(&self.pool)
            .await
            .map_err(SqliteDaoError::query(SAVES, "delete save"))?;

        Ok(result.rows_affected() > 0)
    }
}

async fn insert_member(conn: &mut SqliteConnection, member: &RoomMemberEntity) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO room_members ({MEMBER_COLUMNS}) VALUES (?, ?, ?, ?, ?)"
    ))
    .bind(member.room_id.to_string())
    .bind(member.user_id.to_string())
    .bind(&member.color)
    .bind(&member.display_name)
    .bind(to_millis(member.joined_at))
    .execute(conn)
    .await?;
    Ok(())
}

async fn find_member(
    conn: &mut SqliteConnection,
    room_id: Uuid,
    user_id: Uuid,
) -> SqliteResult<Option<RoomMemberEntity>> {
    let row: Option<MemberRow> = sqlx::query_as(&format!(
        "SELECT {MEMBER_COLUMNS} FROM room_members WHERE room_id = ? AND user_id = ?"
    ))
    .bind(room_id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(conn)
    .await
    .map_err(SqliteDaoError::query(ROOM_MEMBERS, "load member"))?;

    row.map(RoomMemberEntity::try_from).transpose()
}

impl CrosswordStore for SqliteStore {
    fn live_code_exists(
        &self,
        code: String,
        now: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.live_code_exists(&code, now).await.map_err(Into::into) })
    }

    fn insert_room(
        &self,
        room: RoomEntity,
        creator: RoomMemberEntity,
    ) -> BoxFuture<'static, StorageResult<InsertRoomOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.insert_room(room, creator).await.map_err(Into::into) })
    }

    fn find_room(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomAggregate>>> {
        let store = self.clone();
        Box::pin(async move { store.find_room(&code).await.map_err(Into::into) })
    }

    fn add_member(
        &self,
        member: RoomMemberEntity,
    ) -> BoxFuture<'static, StorageResult<AddMemberOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.add_member(member).await.map_err(Into::into) })
    }

    fn remove_member(&self, code: String, user_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.remove_member(&code, user_id).await.map_err(Into::into) })
    }

    fn set_member_color(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        color: String,
    ) -> BoxFuture<'static, StorageResult<ColorChangeOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_member_color(room_id, user_id, &color)
                .await
                .map_err(Into::into)
        })
    }

    fn is_member(&self, code: String, user_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.is_member(&code, user_id).await.map_err(Into::into) })
    }

    fn apply_state_patch(
        &self,
        code: String,
        patch: RoomStatePatch,
        now: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .apply_state_patch(&code, patch, now)
                .await
                .map_err(Into::into)
        })
    }

    fn replace_puzzle(
        &self,
        code: String,
        puzzle_id: String,
        puzzle_data: Value,
        now: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_puzzle(&code, &puzzle_id, &puzzle_data, now)
                .await
                .map_err(Into::into)
        })
    }

    fn purge_expired(&self, cutoff: OffsetDateTime) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.purge_expired(cutoff).await.map_err(Into::into) })
    }

    fn list_saves(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<SaveEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_saves(user_id).await.map_err(Into::into) })
    }

    fn find_save(
        &self,
        user_id: Uuid,
        puzzle_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<SaveEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_save(user_id, &puzzle_id).await.map_err(Into::into) })
    }

    fn upsert_save(&self, save: SaveEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_save(save).await.map_err(Into::into) })
    }

    fn delete_save(
        &self,
        user_id: Uuid,
        puzzle_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_save(user_id, &puzzle_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::{Duration, macros::datetime};

    use super::*;
    use crate::dao::models::SharedStateEntity;

    const T0: OffsetDateTime = datetime!(2024-01-01 12:00 UTC);

    async fn store() -> SqliteStore {
        SqliteStore::connect(SqliteConfig::in_memory())
            .await
            .expect("in-memory store")
    }

    fn room(code: &str, max_members: u8, expires_at: Option<OffsetDateTime>) -> RoomEntity {
        RoomEntity {
            id: Uuid::new_v4(),
            code: code.into(),
            puzzle_id: "2024-01-01".into(),
            puzzle_data: json!({"size": {"rows": 15, "cols": 15}}),
            created_by: Uuid::new_v4(),
            created_at: T0,
            updated_at: T0,
            expires_at,
            max_members,
            state: SharedStateEntity::default(),
        }
    }

    fn member(room: &RoomEntity, user_id: Uuid, color: &str) -> RoomMemberEntity {
        RoomMemberEntity {
            room_id: room.id,
            user_id,
            color: color.into(),
            display_name: format!("user {color}"),
            joined_at: T0,
        }
    }

    async fn seeded(store: &SqliteStore, code: &str, max_members: u8) -> RoomEntity {
        let room = room(code, max_members, None);
        let creator = member(&room, room.created_by, "#4A90D9");
        assert_eq!(
            store.insert_room(room.clone(), creator).await.unwrap(),
            InsertRoomOutcome::Inserted
        );
        room
    }

    #[tokio::test]
    async fn insert_and_find_room_with_creator() {
        let store = store().await;
        let room = seeded(&store, "ABC234", 4).await;

        let aggregate = store.find_room("ABC234").await.unwrap().unwrap();
        assert_eq!(aggregate.room, room);
        assert_eq!(aggregate.members.len(), 1);
        assert_eq!(aggregate.members[0].user_id, room.created_by);
        assert!(store.find_room("ZZZZZZ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn live_code_is_taken_but_expired_code_is_reclaimed() {
        let store = store().await;
        seeded(&store, "LIVE22", 4).await;

        let duplicate = room("LIVE22", 4, None);
        let creator = member(&duplicate, duplicate.created_by, "#4A90D9");
        assert_eq!(
            store.insert_room(duplicate, creator).await.unwrap(),
            InsertRoomOutcome::CodeTaken
        );

        let expired = room("OLD333", 4, Some(T0 - Duration::hours(1)));
        let creator = member(&expired, expired.created_by, "#4A90D9");
        store.insert_room(expired, creator).await.unwrap();
        assert!(!store.live_code_exists("OLD333", T0).await.unwrap());

        let fresh = room("OLD333", 4, None);
        let creator = member(&fresh, fresh.created_by, "#4A90D9");
        assert_eq!(
            store.insert_room(fresh.clone(), creator).await.unwrap(),
            InsertRoomOutcome::Inserted
        );
        let found = store.find_room("OLD333").await.unwrap().unwrap();
        assert_eq!(found.room.id, fresh.id);
    }

    #[tokio::test]
    async fn duplicate_color_is_rejected_by_the_store() {
        let store = store().await;
        let room = seeded(&store, "COLR22", 4).await;

        let outcome = store
            .add_member(member(&room, Uuid::new_v4(), "#4A90D9"))
            .await
            .unwrap();
        assert_eq!(outcome, AddMemberOutcome::ColorTaken);

        let aggregate = store.find_room("COLR22").await.unwrap().unwrap();
        assert_eq!(aggregate.members.len(), 1);
    }

    #[tokio::test]
    async fn capacity_trigger_rejects_extra_member() {
        let store = store().await;
        let room = seeded(&store, "FULL22", 2).await;

        let second = member(&room, Uuid::new_v4(), "#E74C3C");
        assert_eq!(
            store.add_member(second.clone()).await.unwrap(),
            AddMemberOutcome::Added(second)
        );

        let third = member(&room, Uuid::new_v4(), "#2ECC71");
        assert_eq!(store.add_member(third).await.unwrap(), AddMemberOutcome::Full);
        assert_eq!(store.find_room("FULL22").await.unwrap().unwrap().members.len(), 2);
    }

    #[tokio::test]
    async fn adding_existing_member_returns_stored_row() {
        let store = store().await;
        let room = seeded(&store, "DUPE22", 4).await;

        let again = member(&room, room.created_by, "#E74C3C");
        match store.add_member(again).await.unwrap() {
            AddMemberOutcome::AlreadyMember(existing) => assert_eq!(existing.color, "#4A90D9"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn color_change_respects_other_members() {
        let store = store().await;
        let room = seeded(&store, "PAINT2", 4).await;
        let guest = Uuid::new_v4();
        store
            .add_member(member(&room, guest, "#E74C3C"))
            .await
            .unwrap();

        assert_eq!(
            store
                .set_member_color(room.id, guest, "#4A90D9")
                .await
                .unwrap(),
            ColorChangeOutcome::Taken
        );
        match store
            .set_member_color(room.id, guest, "#9B59B6")
            .await
            .unwrap()
        {
            ColorChangeOutcome::Updated(updated) => assert_eq!(updated.color, "#9B59B6"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            store
                .set_member_color(room.id, Uuid::new_v4(), "#2ECC71")
                .await
                .unwrap(),
            ColorChangeOutcome::NotMember
        );
    }

    #[tokio::test]
    async fn partial_patch_touches_only_present_fields() {
        let store = store().await;
        seeded(&store, "PATCH2", 4).await;

        let full = RoomStatePatch {
            user_grid: Some(vec![json!(["A", "B"])]),
            checked_cells: Some(vec![json!([false, true])]),
            accumulated_seconds: Some(42),
            timer_started_at: Some(Some(T0)),
            is_complete: Some(false),
            is_paused: Some(false),
        };
        assert!(store.apply_state_patch("PATCH2", full, T0).await.unwrap());

        let pause = RoomStatePatch {
            is_paused: Some(true),
            ..RoomStatePatch::default()
        };
        let later = T0 + Duration::minutes(1);
        assert!(store.apply_state_patch("PATCH2", pause, later).await.unwrap());

        let state = store.find_room("PATCH2").await.unwrap().unwrap().room;
        assert!(state.state.is_paused);
        assert_eq!(state.state.user_grid, vec![json!(["A", "B"])]);
        assert_eq!(state.state.accumulated_seconds, 42);
        assert_eq!(state.state.timer_started_at, Some(T0));
        assert_eq!(state.updated_at, later);

        assert!(!store
            .apply_state_patch("NOPE22", RoomStatePatch::default(), T0)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn replace_puzzle_resets_progress() {
        let store = store().await;
        seeded(&store, "SWAP22", 4).await;
        let progress = RoomStatePatch {
            user_grid: Some(vec![json!("X")]),
            accumulated_seconds: Some(90),
            timer_started_at: Some(Some(T0)),
            is_complete: Some(true),
            ..RoomStatePatch::default()
        };
        store.apply_state_patch("SWAP22", progress, T0).await.unwrap();

        assert!(store
            .replace_puzzle("SWAP22", "2024-02-02", &json!({"new": true}), T0)
            .await
            .unwrap());

        let room = store.find_room("SWAP22").await.unwrap().unwrap().room;
        assert_eq!(room.puzzle_id, "2024-02-02");
        assert_eq!(room.puzzle_data, json!({"new": true}));
        assert_eq!(room.state, SharedStateEntity::default());
    }

    #[tokio::test]
    async fn purge_cascades_to_members() {
        let store = store().await;
        let expired = room("GONE22", 4, Some(T0 - Duration::days(10)));
        let creator = member(&expired, expired.created_by, "#4A90D9");
        store.insert_room(expired.clone(), creator).await.unwrap();

        assert_eq!(store.purge_expired(T0 - Duration::days(7)).await.unwrap(), 1);
        assert!(store.find_room("GONE22").await.unwrap().is_none());
        assert!(!store.is_member("GONE22", expired.created_by).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_save_keeps_creation_time() {
        let store = store().await;
        let user_id = Uuid::new_v4();
        let mut save = SaveEntity {
            user_id,
            puzzle_id: "2024-01-01".into(),
            user_grid: vec![json!("A")],
            checked_cells: vec![],
            elapsed_seconds: 10,
            is_complete: false,
            cells_filled: 1,
            total_cells: 225,
            completion_pct: 0,
            puzzle_date: None,
            created_at: T0,
            updated_at: T0,
        };
        store.upsert_save(save.clone()).await.unwrap();

        save.elapsed_seconds = 99;
        save.created_at = T0 + Duration::hours(1);
        save.updated_at = T0 + Duration::hours(1);
        store.upsert_save(save).await.unwrap();

        let stored = store.find_save(user_id, "2024-01-01").await.unwrap().unwrap();
        assert_eq!(stored.elapsed_seconds, 99);
        assert_eq!(stored.created_at, T0);
        assert_eq!(stored.updated_at, T0 + Duration::hours(1));
        assert!(store.delete_save(user_id, "2024-01-01").await.unwrap());
        assert!(!store.delete_save(user_id, "2024-01-01").await.unwrap());
    }
}
