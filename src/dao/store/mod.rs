pub mod sqlite;

use futures::future::BoxFuture;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dao::models::{
    AddMemberOutcome, ColorChangeOutcome, InsertRoomOutcome, RoomAggregate, RoomEntity,
    RoomMemberEntity, RoomStatePatch, SaveEntity,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for rooms, memberships and saves.
///
/// Every mutation is scoped to a single room and must be atomic: implementations
/// enforce membership uniqueness, color uniqueness and capacity themselves rather
/// than trusting the caller's prior read.
pub trait CrosswordStore: Send + Sync {
    /// Whether a non-expired room currently owns `code`.
    fn live_code_exists(
        &self,
        code: String,
        now: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Insert a room and its creator's membership in one transaction.
    fn insert_room(
        &self,
        room: RoomEntity,
        creator: RoomMemberEntity,
    ) -> BoxFuture<'static, StorageResult<InsertRoomOutcome>>;
    fn find_room(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomAggregate>>>;
    fn add_member(
        &self,
        member: RoomMemberEntity,
    ) -> BoxFuture<'static, StorageResult<AddMemberOutcome>>;
    fn remove_member(&self, code: String, user_id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    fn set_member_color(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        color: String,
    ) -> BoxFuture<'static, StorageResult<ColorChangeOutcome>>;
    fn is_member(&self, code: String, user_id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Merge the present fields of `patch` into the room state; `false` when the room is absent.
    fn apply_state_patch(
        &self,
        code: String,
        patch: RoomStatePatch,
        now: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Swap the active puzzle and reset all shared progress in one statement.
    fn replace_puzzle(
        &self,
        code: String,
        puzzle_id: String,
        puzzle_data: Value,
        now: OffsetDateTime,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Delete rooms (and, by cascade, their members) that expired before `cutoff`.
    fn purge_expired(&self, cutoff: OffsetDateTime) -> BoxFuture<'static, StorageResult<u64>>;
    fn list_saves(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<SaveEntity>>>;
    fn find_save(
        &self,
        user_id: Uuid,
        puzzle_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<SaveEntity>>>;
    /// Insert or replace a save, keeping the original creation timestamp.
    fn upsert_save(&self, save: SaveEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn delete_save(
        &self,
        user_id: Uuid,
        puzzle_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
