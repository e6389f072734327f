use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Collaborative room persisted by the storage layer (members are stored separately).
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEntity {
    /// Opaque primary key, assigned at creation.
    pub id: Uuid,
    /// Short human-typable code, unique among live rooms.
    pub code: String,
    /// Identifier of the puzzle currently being solved.
    pub puzzle_id: String,
    /// Embedded puzzle content.
    pub puzzle_data: Value,
    /// User who created the room.
    pub created_by: Uuid,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Last time the shared state or puzzle changed.
    pub updated_at: OffsetDateTime,
    /// When set and in the past, the room is logically dead.
    pub expires_at: Option<OffsetDateTime>,
    /// Capacity of the room, bounded by the member palette size.
    pub max_members: u8,
    /// Shared solving progress.
    pub state: SharedStateEntity,
}

impl RoomEntity {
    /// Whether the room's time-to-live has passed at `now`.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Solving progress shared by every member of a room.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SharedStateEntity {
    /// Cell contents, as sent by the clients.
    pub user_grid: Vec<Value>,
    /// Per-cell check flags, as sent by the clients.
    pub checked_cells: Vec<Value>,
    /// Seconds accumulated by the timer before the current run.
    pub accumulated_seconds: i64,
    /// When set, the timer is running since this instant.
    pub timer_started_at: Option<OffsetDateTime>,
    /// Whether the puzzle has been solved.
    pub is_complete: bool,
    /// Whether the timer has been paused by a member.
    pub is_paused: bool,
}

impl SharedStateEntity {
    /// Elapsed seconds including the currently running stretch, if any.
    pub fn effective_seconds(&self, now: OffsetDateTime) -> i64 {
        let running = self
            .timer_started_at
            .map(|started| (now - started).whole_seconds().max(0))
            .unwrap_or(0);
        self.accumulated_seconds.saturating_add(running)
    }
}

/// Binding between a room and a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMemberEntity {
    /// Room the membership belongs to.
    pub room_id: Uuid,
    /// Member identity.
    pub user_id: Uuid,
    /// `#RRGGBB` color, unique among the members of the room.
    pub color: String,
    /// Snapshot of the user's name at join time.
    pub display_name: String,
    /// Join timestamp, never updated.
    pub joined_at: OffsetDateTime,
}

/// A room together with its current members, ordered by join time.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomAggregate {
    pub room: RoomEntity,
    pub members: Vec<RoomMemberEntity>,
}

impl RoomAggregate {
    /// Membership of `user_id`, compared by identity.
    pub fn member(&self, user_id: Uuid) -> Option<&RoomMemberEntity> {
        self.members.iter().find(|member| member.user_id == user_id)
    }

    /// Colors currently held by members of the room.
    pub fn used_colors(&self) -> Vec<&str> {
        self.members
            .iter()
            .map(|member| member.color.as_str())
            .collect()
    }

    /// Whether the room has reached its capacity.
    pub fn is_full(&self) -> bool {
        self.members.len() >= usize::from(self.room.max_members)
    }
}

/// Sparse update of the shared state: `None` leaves the stored value untouched.
///
/// `timer_started_at` is doubly optional so that a present-but-empty value can
/// stop the timer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomStatePatch {
    pub user_grid: Option<Vec<Value>>,
    pub checked_cells: Option<Vec<Value>>,
    pub accumulated_seconds: Option<i64>,
    pub timer_started_at: Option<Option<OffsetDateTime>>,
    pub is_complete: Option<bool>,
    pub is_paused: Option<bool>,
}

impl RoomStatePatch {
    /// True when the patch carries no field at all.
    pub fn is_empty(&self) -> bool {
        self.user_grid.is_none()
            && self.checked_cells.is_none()
            && self.accumulated_seconds.is_none()
            && self.timer_started_at.is_none()
            && self.is_complete.is_none()
            && self.is_paused.is_none()
    }
}

/// Result of inserting a freshly generated room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertRoomOutcome {
    Inserted,
    /// A live room already owns the code; the caller should draw another one.
    CodeTaken,
}

/// Result of inserting a membership row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddMemberOutcome {
    Added(RoomMemberEntity),
    /// The user already had a membership; the stored row is returned unchanged.
    AlreadyMember(RoomMemberEntity),
    /// The capacity constraint rejected the insert.
    Full,
    /// Another member grabbed the requested color concurrently.
    ColorTaken,
    /// The room vanished between lookup and insert.
    RoomMissing,
}

/// Result of a member color change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorChangeOutcome {
    Updated(RoomMemberEntity),
    NotMember,
    /// Another member of the same room holds the color.
    Taken,
}

/// Per-user progress on a single puzzle, outside of any room.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveEntity {
    pub user_id: Uuid,
    pub puzzle_id: String,
    pub user_grid: Vec<Value>,
    pub checked_cells: Vec<Value>,
    pub elapsed_seconds: i64,
    pub is_complete: bool,
    pub cells_filled: i64,
    pub total_cells: i64,
    pub completion_pct: i64,
    /// Display date of the puzzle; falls back to the puzzle id when unknown.
    pub puzzle_date: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
