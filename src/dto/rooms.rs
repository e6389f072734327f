//! DTO definitions used by the rooms REST API and documentation layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{RoomAggregate, RoomEntity, RoomMemberEntity, RoomStatePatch},
    dto::{
        format_timestamp,
        validation::{validate_color, validate_puzzle_data, validate_puzzle_id},
    },
    error::ServiceError,
};

/// Payload used to open a new room on a puzzle.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(alias = "puzzle_id")]
    pub puzzle_id: String,
    /// Puzzle content, a JSON object of at most 500 KB once serialized.
    #[serde(alias = "puzzle_data")]
    #[schema(value_type = Object)]
    pub puzzle_data: Value,
}

impl Validate for CreateRoomRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_puzzle(&self.puzzle_id, &self.puzzle_data)
    }
}

/// Payload replacing the puzzle of a room; shared progress is reset.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwitchPuzzleRequest {
    #[serde(alias = "puzzle_id")]
    pub puzzle_id: String,
    #[serde(alias = "puzzle_data")]
    #[schema(value_type = Object)]
    pub puzzle_data: Value,
}

impl Validate for SwitchPuzzleRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_puzzle(&self.puzzle_id, &self.puzzle_data)
    }
}

fn validate_puzzle(puzzle_id: &str, puzzle_data: &Value) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if let Err(e) = validate_puzzle_id(puzzle_id) {
        errors.add("puzzleId", e);
    }
    if let Err(e) = validate_puzzle_data(puzzle_data) {
        errors.add("puzzleData", e);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Request to change the caller's member color.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateColorRequest {
    /// `#RRGGBB`, must belong to the member palette.
    pub color: String,
}

impl Validate for UpdateColorRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_color(&self.color) {
            errors.add("color", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Sparse update of the shared solving state.
///
/// Absent fields are left untouched. An explicit `null` on a non-nullable field is treated
/// as absent.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStateRequest {
    #[serde(default)]
    #[schema(value_type = Option<Vec<Object>>)]
    pub user_grid: Option<Vec<Value>>,
    #[serde(default)]
    #[schema(value_type = Option<Vec<Object>>)]
    pub checked_cells: Option<Vec<Value>>,
    #[serde(default)]
    pub accumulated_seconds: Option<i64>,
    /// If not specified, does not change it.
    /// If null or an empty string is specified, stops the timer.
    /// If an RFC 3339 timestamp is specified, the timer runs from that instant.
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub timer_started_at: Option<Option<String>>,
    #[serde(default)]
    pub is_complete: Option<bool>,
    #[serde(default)]
    pub is_paused: Option<bool>,
}

impl TryFrom<UpdateStateRequest> for RoomStatePatch {
    type Error = ServiceError;

    fn try_from(request: UpdateStateRequest) -> Result<Self, Self::Error> {
        if request.accumulated_seconds.is_some_and(|seconds| seconds < 0) {
            return Err(ServiceError::InvalidInput(
                "accumulatedSeconds must not be negative".into(),
            ));
        }

        let timer_started_at = match request.timer_started_at {
            None => None,
            Some(None) => Some(None),
            Some(Some(raw)) if raw.trim().is_empty() => Some(None),
            Some(Some(raw)) => {
                let started = OffsetDateTime::parse(raw.trim(), &Rfc3339).map_err(|_| {
                    ServiceError::InvalidInput(
                        "timerStartedAt must be an RFC 3339 timestamp".into(),
                    )
                })?;
                Some(Some(started))
            }
        };

        Ok(Self {
            user_grid: request.user_grid,
            checked_cells: request.checked_cells,
            accumulated_seconds: request.accumulated_seconds,
            timer_started_at,
            is_complete: request.is_complete,
            is_paused: request.is_paused,
        })
    }
}

/// Public projection of a room member.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: Uuid,
    pub display_name: String,
    pub color: String,
    pub joined_at: String,
}

impl From<&RoomMemberEntity> for MemberView {
    fn from(member: &RoomMemberEntity) -> Self {
        Self {
            user_id: member.user_id,
            display_name: member.display_name.clone(),
            color: member.color.clone(),
            joined_at: format_timestamp(member.joined_at),
        }
    }
}

/// Room together with its members, ordered by join time.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: Uuid,
    pub code: String,
    pub puzzle_id: String,
    #[schema(value_type = Object)]
    pub puzzle_data: Value,
    pub created_by: Uuid,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub max_members: u8,
    pub members: Vec<MemberView>,
    pub is_complete: bool,
    pub is_paused: bool,
    pub accumulated_seconds: i64,
    pub timer_started_at: Option<String>,
}

impl From<RoomAggregate> for RoomView {
    fn from(aggregate: RoomAggregate) -> Self {
        let RoomAggregate { room, members } = aggregate;
        let members = members.iter().map(MemberView::from).collect();
        let RoomEntity {
            id,
            code,
            puzzle_id,
            puzzle_data,
            created_by,
            created_at,
            expires_at,
            max_members,
            state,
            ..
        } = room;

        Self {
            id,
            code,
            puzzle_id,
            puzzle_data,
            created_by,
            created_at: format_timestamp(created_at),
            expires_at: expires_at.map(format_timestamp),
            max_members,
            members,
            is_complete: state.is_complete,
            is_paused: state.is_paused,
            accumulated_seconds: state.accumulated_seconds,
            timer_started_at: state.timer_started_at.map(format_timestamp),
        }
    }
}

/// Result of a join: the room, the caller's membership and whether it already existed.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub room: RoomView,
    pub member: MemberView,
    pub already_joined: bool,
}

/// Room and the caller's updated membership.
#[derive(Debug, Serialize, ToSchema)]
pub struct MemberUpdateResponse {
    pub room: RoomView,
    pub member: MemberView,
}

/// Shared solving state handed to late joiners.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateResponse {
    #[schema(value_type = Vec<Object>)]
    pub user_grid: Vec<Value>,
    #[schema(value_type = Vec<Object>)]
    pub checked_cells: Vec<Value>,
    pub accumulated_seconds: i64,
    /// Accumulated seconds plus the currently running stretch, if any.
    pub effective_seconds: i64,
    pub timer_started_at: Option<String>,
    pub is_complete: bool,
    pub is_paused: bool,
    pub puzzle_id: String,
    #[schema(value_type = Object)]
    pub puzzle_data: Value,
}

impl RoomStateResponse {
    /// Snapshot `room` as seen at `now`.
    pub fn snapshot(room: RoomEntity, now: OffsetDateTime) -> Self {
        let effective_seconds = room.state.effective_seconds(now);
        let state = room.state;

        Self {
            user_grid: state.user_grid,
            checked_cells: state.checked_cells,
            accumulated_seconds: state.accumulated_seconds,
            effective_seconds,
            timer_started_at: state.timer_started_at.map(format_timestamp),
            is_complete: state.is_complete,
            is_paused: state.is_paused,
            puzzle_id: room.puzzle_id,
            puzzle_data: room.puzzle_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn patch(body: Value) -> Result<RoomStatePatch, ServiceError> {
        serde_json::from_value::<UpdateStateRequest>(body)
            .unwrap()
            .try_into()
    }

    #[test]
    fn absent_fields_stay_absent() {
        let patch = patch(json!({ "isPaused": true })).unwrap();
        assert_eq!(
            patch,
            RoomStatePatch {
                is_paused: Some(true),
                ..RoomStatePatch::default()
            }
        );
    }

    #[test]
    fn null_on_non_nullable_fields_is_ignored() {
        let patch = patch(json!({ "userGrid": null, "isComplete": null })).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn null_or_empty_timer_stops_it() {
        assert_eq!(
            patch(json!({ "timerStartedAt": null })).unwrap().timer_started_at,
            Some(None)
        );
        assert_eq!(
            patch(json!({ "timerStartedAt": "" })).unwrap().timer_started_at,
            Some(None)
        );
    }

    #[test]
    fn timer_accepts_rfc3339_only() {
        assert_eq!(
            patch(json!({ "timerStartedAt": "2024-01-01T12:00:00Z" }))
                .unwrap()
                .timer_started_at,
            Some(Some(datetime!(2024-01-01 12:00 UTC)))
        );
        assert!(matches!(
            patch(json!({ "timerStartedAt": "yesterday" })),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn negative_accumulated_seconds_are_rejected() {
        assert!(matches!(
            patch(json!({ "accumulatedSeconds": -1 })),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn create_request_accepts_snake_case_aliases() {
        let request: CreateRoomRequest = serde_json::from_value(json!({
            "puzzle_id": "2024-01-01",
            "puzzle_data": { "size": { "rows": 15 } }
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let request: CreateRoomRequest = serde_json::from_value(json!({
            "puzzleId": "2024-01-01",
            "puzzleData": [1, 2]
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
