//! Room lifecycle: create, join, leave, color changes and shared state sync.
//!
//! Every operation reads and writes the store directly; no room data is kept in memory.

use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            AddMemberOutcome, ColorChangeOutcome, InsertRoomOutcome, RoomAggregate, RoomEntity,
            RoomMemberEntity, RoomStatePatch, SharedStateEntity,
        },
        store::CrosswordStore,
    },
    dto::rooms::{JoinResponse, MemberUpdateResponse, MemberView, RoomStateResponse, RoomView},
    error::ServiceError,
    realtime::{ChannelToken, channel_name},
    services::room_code::{MAX_CODE_ATTEMPTS, RoomCode},
    state::SharedState,
};

/// Retries of a join that lost a color race against a concurrent join.
const MAX_JOIN_ATTEMPTS: usize = 5;

/// Open a room on `puzzle_id` with the caller as its first member.
pub async fn create_room(
    state: &SharedState,
    user_id: Uuid,
    display_name: &str,
    puzzle_id: String,
    puzzle_data: Value,
) -> Result<RoomView, ServiceError> {
    create_room_with(
        state,
        user_id,
        display_name,
        puzzle_id,
        puzzle_data,
        || RoomCode::random(&mut rand::rng()),
    )
    .await
}

/// [`create_room`] drawing candidate codes from `next_code`.
async fn create_room_with(
    state: &SharedState,
    user_id: Uuid,
    display_name: &str,
    puzzle_id: String,
    puzzle_data: Value,
    mut next_code: impl FnMut() -> RoomCode,
) -> Result<RoomView, ServiceError> {
    let store = state.require_store().await?;
    let config = state.config();
    let color = config
        .first_unused_color(&[])
        .ok_or_else(|| ServiceError::Conflict("no member color available".into()))?
        .to_owned();

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = next_code();
        let now = state.now();

        if store.live_code_exists(code.to_string(), now).await? {
            debug!(%code, attempt, "room code already in use");
            continue;
        }

        let room = RoomEntity {
            id: Uuid::new_v4(),
            code: code.to_string(),
            puzzle_id: puzzle_id.clone(),
            puzzle_data: puzzle_data.clone(),
            created_by: user_id,
            created_at: now,
            updated_at: now,
            expires_at: config.room_ttl().map(|ttl| now + ttl),
            max_members: config.max_members(),
            state: SharedStateEntity::default(),
        };
        let creator = RoomMemberEntity {
            room_id: room.id,
            user_id,
            color: color.clone(),
            display_name: display_name.to_owned(),
            joined_at: now,
        };

        match store.insert_room(room.clone(), creator.clone()).await? {
            InsertRoomOutcome::Inserted => {
                info!(%code, user_id = %user_id, puzzle_id = %room.puzzle_id, "room created");
                return Ok(RoomAggregate {
                    room,
                    members: vec![creator],
                }
                .into());
            }
            InsertRoomOutcome::CodeTaken => {
                debug!(%code, attempt, "room code taken during insert");
            }
        }
    }

    warn!(attempts = MAX_CODE_ATTEMPTS, "no free room code found");
    Err(ServiceError::Conflict(
        "could not allocate a unique room code".into(),
    ))
}

/// Room and members; `Expired` when the room outlived its time-to-live.
pub async fn get_room(state: &SharedState, code: &RoomCode) -> Result<RoomView, ServiceError> {
    let store = state.require_store().await?;
    let aggregate = load_live_room(store.as_ref(), code, state.now()).await?;
    Ok(aggregate.into())
}

/// Join a room; joining twice returns the existing membership with `already_joined` set.
pub async fn join_room(
    state: &SharedState,
    code: &RoomCode,
    user_id: Uuid,
    display_name: &str,
) -> Result<JoinResponse, ServiceError> {
    let store = state.require_store().await?;

    for attempt in 1..=MAX_JOIN_ATTEMPTS {
        let aggregate = load_live_room(store.as_ref(), code, state.now()).await?;

        if let Some(existing) = aggregate.member(user_id) {
            let member = MemberView::from(existing);
            return Ok(JoinResponse {
                room: aggregate.into(),
                member,
                already_joined: true,
            });
        }
        if aggregate.is_full() {
            return Err(room_full(code));
        }

        let color = state
            .config()
            .first_unused_color(&aggregate.used_colors())
            .ok_or_else(|| room_full(code))?
            .to_owned();
        let member = RoomMemberEntity {
            room_id: aggregate.room.id,
            user_id,
            color,
            display_name: display_name.to_owned(),
            joined_at: state.now(),
        };

        match store.add_member(member).await? {
            AddMemberOutcome::Added(member) => {
                info!(%code, user_id = %user_id, color = %member.color, "member joined");
                return Ok(JoinResponse {
                    room: reload_room(store.as_ref(), code).await?.into(),
                    member: MemberView::from(&member),
                    already_joined: false,
                });
            }
            AddMemberOutcome::AlreadyMember(member) => {
                return Ok(JoinResponse {
                    room: reload_room(store.as_ref(), code).await?.into(),
                    member: MemberView::from(&member),
                    already_joined: true,
                });
            }
            AddMemberOutcome::Full => return Err(room_full(code)),
            AddMemberOutcome::RoomMissing => return Err(room_not_found(code)),
            AddMemberOutcome::ColorTaken => {
                debug!(%code, attempt, "member color taken concurrently; retrying join");
            }
        }
    }

    warn!(%code, attempts = MAX_JOIN_ATTEMPTS, "join kept losing color races");
    Err(ServiceError::Conflict(
        "could not assign a member color, try again".into(),
    ))
}

/// Remove the caller's membership; its color becomes free for the next joiner.
pub async fn leave_room(
    state: &SharedState,
    code: &RoomCode,
    user_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;

    if !store.remove_member(code.to_string(), user_id).await? {
        return Err(ServiceError::NotFound(format!(
            "room {code} or membership not found"
        )));
    }

    info!(%code, user_id = %user_id, "member left");
    Ok(())
}

/// Give the caller another palette color, unless a different member holds it.
pub async fn update_member_color(
    state: &SharedState,
    code: &RoomCode,
    user_id: Uuid,
    color: &str,
) -> Result<MemberUpdateResponse, ServiceError> {
    let color = state
        .config()
        .palette_color(color)
        .ok_or_else(|| ServiceError::InvalidInput(format!("{color} is not a member color")))?
        .to_owned();
    let store = state.require_store().await?;
    let aggregate = load_live_room(store.as_ref(), code, state.now()).await?;

    let Some(current) = aggregate.member(user_id) else {
        return Err(ServiceError::NotFound(format!(
            "not a member of room {code}"
        )));
    };
    if current.color == color {
        let member = MemberView::from(current);
        return Ok(MemberUpdateResponse {
            room: aggregate.into(),
            member,
        });
    }
    if aggregate
        .members
        .iter()
        .any(|member| member.user_id != user_id && member.color == color)
    {
        return Err(color_taken(&color));
    }

    match store
        .set_member_color(aggregate.room.id, user_id, color.clone())
        .await?
    {
        ColorChangeOutcome::Updated(member) => {
            info!(%code, user_id = %user_id, color = %member.color, "member color changed");
            Ok(MemberUpdateResponse {
                room: reload_room(store.as_ref(), code).await?.into(),
                member: MemberView::from(&member),
            })
        }
        ColorChangeOutcome::Taken => Err(color_taken(&color)),
        ColorChangeOutcome::NotMember => Err(ServiceError::NotFound(format!(
            "not a member of room {code}"
        ))),
    }
}

/// Membership predicate; `false` for rooms that do not exist. Expiry is not considered.
pub async fn is_member(
    state: &SharedState,
    code: &RoomCode,
    user_id: Uuid,
) -> Result<bool, ServiceError> {
    let store = state.require_store().await?;
    Ok(store.is_member(code.to_string(), user_id).await?)
}

/// Shared state snapshot for a late joiner.
pub async fn get_room_state(
    state: &SharedState,
    code: &RoomCode,
    user_id: Uuid,
) -> Result<RoomStateResponse, ServiceError> {
    let store = require_member(state, code, user_id).await?;
    let aggregate = reload_room(store.as_ref(), code).await?;
    Ok(RoomStateResponse::snapshot(aggregate.room, state.now()))
}

/// Merge the fields present in `patch` into the shared state.
pub async fn update_room_state(
    state: &SharedState,
    code: &RoomCode,
    user_id: Uuid,
    patch: RoomStatePatch,
) -> Result<(), ServiceError> {
    let store = require_member(state, code, user_id).await?;

    if patch.is_empty() {
        debug!(%code, user_id = %user_id, "empty room state update ignored");
        return Ok(());
    }

    if !store
        .apply_state_patch(code.to_string(), patch, state.now())
        .await?
    {
        return Err(room_not_found(code));
    }

    debug!(%code, user_id = %user_id, "room state synced");
    Ok(())
}

/// Replace the puzzle and reset shared progress in one write.
pub async fn switch_puzzle(
    state: &SharedState,
    code: &RoomCode,
    user_id: Uuid,
    puzzle_id: String,
    puzzle_data: Value,
) -> Result<(), ServiceError> {
    let store = require_member(state, code, user_id).await?;

    if !store
        .replace_puzzle(code.to_string(), puzzle_id.clone(), puzzle_data, state.now())
        .await?
    {
        return Err(room_not_found(code));
    }

    info!(%code, user_id = %user_id, puzzle_id = %puzzle_id, "room puzzle switched");
    Ok(())
}

/// Capability on the room's realtime channel, for members only.
pub async fn issue_channel_token(
    state: &SharedState,
    code: &RoomCode,
    user_id: Uuid,
) -> Result<ChannelToken, ServiceError> {
    require_member(state, code, user_id).await?;

    let token = state
        .token_issuer()
        .issue(user_id.to_string(), channel_name(code.as_str()))
        .await?;
    Ok(token)
}

async fn require_member(
    state: &SharedState,
    code: &RoomCode,
    user_id: Uuid,
) -> Result<Arc<dyn CrosswordStore>, ServiceError> {
    let store = state.require_store().await?;
    if store.is_member(code.to_string(), user_id).await? {
        Ok(store)
    } else {
        Err(ServiceError::Forbidden(format!(
            "not a member of room {code}"
        )))
    }
}

async fn load_live_room(
    store: &dyn CrosswordStore,
    code: &RoomCode,
    now: OffsetDateTime,
) -> Result<RoomAggregate, ServiceError> {
    let aggregate = reload_room(store, code).await?;
    if aggregate.room.is_expired(now) {
        return Err(ServiceError::Expired(format!("room {code} has expired")));
    }
    Ok(aggregate)
}

async fn reload_room(
    store: &dyn CrosswordStore,
    code: &RoomCode,
) -> Result<RoomAggregate, ServiceError> {
    store
        .find_room(code.to_string())
        .await?
        .ok_or_else(|| room_not_found(code))
}

fn room_not_found(code: &RoomCode) -> ServiceError {
    ServiceError::NotFound(format!("room {code} not found"))
}

fn room_full(code: &RoomCode) -> ServiceError {
    ServiceError::Full(format!("room {code} is full"))
}

fn color_taken(color: &str) -> ServiceError {
    ServiceError::Conflict(format!("color {color} already taken by another member"))
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use serde_json::json;
    use time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::SaveEntity,
            storage::StorageResult,
            store::sqlite::{SqliteConfig, SqliteStore},
        },
        services::test_support::Harness,
    };

    fn puzzle() -> Value {
        json!({ "size": { "rows": 15, "cols": 15 }, "grid": [] })
    }

    async fn create(harness: &Harness, user: Uuid) -> RoomCode {
        let room = create_room(&harness.state, user, "creator", "2024-01-01".into(), puzzle())
            .await
            .unwrap();
        RoomCode::parse(&room.code).unwrap()
    }

    #[tokio::test]
    async fn colors_follow_lowest_free_palette_slot() {
        let harness = Harness::new(AppConfig::default()).await;
        let palette = harness.state.config().member_colors().to_vec();
        let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let room = create_room(&harness.state, u1, "U1", "2024-01-01".into(), puzzle())
            .await
            .unwrap();
        assert_eq!(room.members.len(), 1);
        assert_eq!(room.members[0].user_id, u1);
        assert_eq!(room.members[0].color, palette[0]);
        let code = RoomCode::parse(&room.code).unwrap();

        let joined = join_room(&harness.state, &code, u2, "U2").await.unwrap();
        assert!(!joined.already_joined);
        assert_eq!(joined.member.color, palette[1]);
        assert_eq!(joined.room.members.len(), 2);

        leave_room(&harness.state, &code, u1).await.unwrap();
        let room = get_room(&harness.state, &code).await.unwrap();
        assert_eq!(room.members.len(), 1);
        assert_eq!(room.members[0].user_id, u2);

        let third = join_room(&harness.state, &code, u3, "U3").await.unwrap();
        assert_eq!(third.member.color, palette[0]);
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let harness = Harness::new(AppConfig::default()).await;
        let code = create(&harness, Uuid::new_v4()).await;
        let guest = Uuid::new_v4();

        let first = join_room(&harness.state, &code, guest, "guest").await.unwrap();
        let second = join_room(&harness.state, &code, guest, "guest renamed")
            .await
            .unwrap();

        assert!(second.already_joined);
        assert_eq!(second.member.color, first.member.color);
        assert_eq!(second.member.display_name, "guest");
        assert_eq!(second.room.members.len(), 2);
    }

    #[tokio::test]
    async fn join_beyond_capacity_reports_full() {
        let harness = Harness::new(AppConfig::default()).await;
        let code = create(&harness, Uuid::new_v4()).await;
        let capacity = usize::from(harness.state.config().max_members());

        for _ in 1..capacity {
            join_room(&harness.state, &code, Uuid::new_v4(), "guest")
                .await
                .unwrap();
        }

        let late = join_room(&harness.state, &code, Uuid::new_v4(), "late").await;
        assert!(matches!(late, Err(ServiceError::Full(_))));
        assert_eq!(
            get_room(&harness.state, &code).await.unwrap().members.len(),
            capacity
        );
    }

    #[tokio::test]
    async fn expired_room_is_distinct_from_missing_room() {
        let config = AppConfig::default().with_room_ttl(Some(Duration::hours(1)));
        let harness = Harness::new(config).await;
        let creator = Uuid::new_v4();
        let code = create(&harness, creator).await;

        harness.clock.advance(Duration::hours(2));

        assert!(matches!(
            get_room(&harness.state, &code).await,
            Err(ServiceError::Expired(_))
        ));
        assert!(matches!(
            join_room(&harness.state, &code, Uuid::new_v4(), "late").await,
            Err(ServiceError::Expired(_))
        ));
        let missing = RoomCode::parse("ZZZZZZ").unwrap();
        assert!(matches!(
            get_room(&harness.state, &missing).await,
            Err(ServiceError::NotFound(_))
        ));

        // Membership survives expiry and can still be dropped.
        assert!(is_member(&harness.state, &code, creator).await.unwrap());
        leave_room(&harness.state, &code, creator).await.unwrap();
    }

    #[tokio::test]
    async fn color_change_rules() {
        let harness = Harness::new(AppConfig::default()).await;
        let palette = harness.state.config().member_colors().to_vec();
        let creator = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let code = create(&harness, creator).await;
        join_room(&harness.state, &code, guest, "guest").await.unwrap();

        let taken = update_member_color(&harness.state, &code, guest, &palette[0]).await;
        assert!(matches!(taken, Err(ServiceError::Conflict(_))));
        let room = get_room(&harness.state, &code).await.unwrap();
        assert_eq!(room.members[1].color, palette[1]);

        let outside = update_member_color(&harness.state, &code, guest, "#000000").await;
        assert!(matches!(outside, Err(ServiceError::InvalidInput(_))));

        let stranger =
            update_member_color(&harness.state, &code, Uuid::new_v4(), &palette[2]).await;
        assert!(matches!(stranger, Err(ServiceError::NotFound(_))));

        let same = update_member_color(&harness.state, &code, guest, &palette[1])
            .await
            .unwrap();
        assert_eq!(same.member.color, palette[1]);

        let lower = palette[3].to_ascii_lowercase();
        let changed = update_member_color(&harness.state, &code, guest, &lower)
            .await
            .unwrap();
        assert_eq!(changed.member.color, palette[3]);
        assert_eq!(changed.room.members[1].color, palette[3]);
    }

    #[tokio::test]
    async fn member_gate_applies_whether_or_not_room_exists() {
        let harness = Harness::new(AppConfig::default()).await;
        let code = create(&harness, Uuid::new_v4()).await;
        let outsider = Uuid::new_v4();
        let missing = RoomCode::parse("NOPE99").unwrap();

        for target in [&code, &missing] {
            assert!(matches!(
                issue_channel_token(&harness.state, target, outsider).await,
                Err(ServiceError::Forbidden(_))
            ));
            assert!(matches!(
                get_room_state(&harness.state, target, outsider).await,
                Err(ServiceError::Forbidden(_))
            ));
            assert!(matches!(
                update_room_state(&harness.state, target, outsider, RoomStatePatch::default())
                    .await,
                Err(ServiceError::Forbidden(_))
            ));
            assert!(matches!(
                switch_puzzle(&harness.state, target, outsider, "x".into(), puzzle()).await,
                Err(ServiceError::Forbidden(_))
            ));
        }
        assert!(harness.issuer.calls().is_empty());
    }

    #[tokio::test]
    async fn members_get_tokens_for_their_room_channel() {
        let harness = Harness::new(AppConfig::default()).await;
        let creator = Uuid::new_v4();
        let code = create(&harness, creator).await;

        let token = issue_channel_token(&harness.state, &code, creator)
            .await
            .unwrap();

        assert_eq!(token.client_id, Some(creator.to_string()));
        assert_eq!(
            harness.issuer.calls(),
            vec![(creator.to_string(), format!("room:{code}"))]
        );
    }

    #[tokio::test]
    async fn unconfigured_issuer_is_unavailable_not_forbidden() {
        let harness = Harness::with_disabled_issuer(AppConfig::default()).await;
        let creator = Uuid::new_v4();
        let code = create(&harness, creator).await;

        assert!(matches!(
            issue_channel_token(&harness.state, &code, creator).await,
            Err(ServiceError::RealtimeUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn partial_state_update_leaves_other_fields() {
        let harness = Harness::new(AppConfig::default()).await;
        let creator = Uuid::new_v4();
        let code = create(&harness, creator).await;
        let start = harness.state.now();

        let progress = RoomStatePatch {
            user_grid: Some(vec![json!(["C", "A", "T"])]),
            accumulated_seconds: Some(30),
            timer_started_at: Some(Some(start)),
            ..RoomStatePatch::default()
        };
        update_room_state(&harness.state, &code, creator, progress)
            .await
            .unwrap();

        harness.clock.advance(Duration::seconds(15));
        let snapshot = get_room_state(&harness.state, &code, creator).await.unwrap();
        assert_eq!(snapshot.effective_seconds, 45);

        let pause = RoomStatePatch {
            is_paused: Some(true),
            ..RoomStatePatch::default()
        };
        update_room_state(&harness.state, &code, creator, pause)
            .await
            .unwrap();

        let snapshot = get_room_state(&harness.state, &code, creator).await.unwrap();
        assert!(snapshot.is_paused);
        assert_eq!(snapshot.user_grid, vec![json!(["C", "A", "T"])]);
        assert_eq!(snapshot.accumulated_seconds, 30);
        assert!(snapshot.timer_started_at.is_some());
    }

    #[tokio::test]
    async fn switching_puzzle_resets_progress() {
        let harness = Harness::new(AppConfig::default()).await;
        let creator = Uuid::new_v4();
        let code = create(&harness, creator).await;

        let progress = RoomStatePatch {
            user_grid: Some(vec![json!("X")]),
            checked_cells: Some(vec![json!(true)]),
            accumulated_seconds: Some(120),
            is_complete: Some(true),
            ..RoomStatePatch::default()
        };
        update_room_state(&harness.state, &code, creator, progress)
            .await
            .unwrap();

        switch_puzzle(
            &harness.state,
            &code,
            creator,
            "2024-02-02".into(),
            json!({ "new": true }),
        )
        .await
        .unwrap();

        let snapshot = get_room_state(&harness.state, &code, creator).await.unwrap();
        assert_eq!(snapshot.puzzle_id, "2024-02-02");
        assert_eq!(snapshot.puzzle_data, json!({ "new": true }));
        assert!(snapshot.user_grid.is_empty());
        assert!(snapshot.checked_cells.is_empty());
        assert_eq!(snapshot.accumulated_seconds, 0);
        assert!(snapshot.timer_started_at.is_none());
        assert!(!snapshot.is_complete);
    }

    #[tokio::test]
    async fn leaving_twice_reports_not_found() {
        let harness = Harness::new(AppConfig::default()).await;
        let creator = Uuid::new_v4();
        let code = create(&harness, creator).await;

        leave_room(&harness.state, &code, creator).await.unwrap();
        assert!(matches!(
            leave_room(&harness.state, &code, creator).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(!is_member(&harness.state, &code, creator).await.unwrap());
    }

    #[tokio::test]
    async fn degraded_mode_rejects_room_operations() {
        let harness = Harness::new(AppConfig::default()).await;
        harness.state.clear_store().await;

        assert!(matches!(
            create_room(&harness.state, Uuid::new_v4(), "x", "p".into(), puzzle()).await,
            Err(ServiceError::Degraded)
        ));
    }
    #[tokio::test]
    async fn empty_state_update_is_accepted_for_members_only() {
        let harness = Harness::new(AppConfig::default()).await;
        let creator = Uuid::new_v4();
        let code = create(&harness, creator).await;

        update_room_state(&harness.state, &code, creator, RoomStatePatch::default())
            .await
            .unwrap();
        let snapshot = get_room_state(&harness.state, &code, creator).await.unwrap();
        assert_eq!(snapshot.accumulated_seconds, 0);
        assert!(snapshot.timer_started_at.is_none());

        assert!(matches!(
            update_room_state(
                &harness.state,
                &code,
                Uuid::new_v4(),
                RoomStatePatch::default()
            )
            .await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn huge_accumulated_time_saturates_instead_of_overflowing() {
        let harness = Harness::new(AppConfig::default()).await;
        let creator = Uuid::new_v4();
        let code = create(&harness, creator).await;

        let patch = RoomStatePatch {
            accumulated_seconds: Some(i64::MAX),
            timer_started_at: Some(Some(harness.state.now())),
            ..RoomStatePatch::default()
        };
        update_room_state(&harness.state, &code, creator, patch)
            .await
            .unwrap();
        harness.clock.advance(Duration::seconds(10));

        let snapshot = get_room_state(&harness.state, &code, creator).await.unwrap();
        assert_eq!(snapshot.effective_seconds, i64::MAX);
    }

    #[tokio::test]
    async fn code_generation_gives_up_after_bounded_collisions() {
        let harness = Harness::new(AppConfig::default()).await;
        let owner = Uuid::new_v4();
        let taken = create(&harness, owner).await;

        let mut attempts = 0;
        let result = create_room_with(
            &harness.state,
            Uuid::new_v4(),
            "late",
            "2024-01-02".into(),
            puzzle(),
            || {
                attempts += 1;
                taken.clone()
            },
        )
        .await;

        assert!(matches!(result, Err(ServiceError::Conflict(_))));
        assert_eq!(attempts, MAX_CODE_ATTEMPTS);
        let room = get_room(&harness.state, &taken).await.unwrap();
        assert_eq!(room.created_by, owner);
        assert_eq!(room.puzzle_id, "2024-01-01");
        assert_eq!(room.members.len(), 1);
    }

    /// Store whose live-code check never sees a collision, as when a concurrent
    /// create wins the code between the check and the insert.
    struct RacedCodeCheck(Arc<dyn CrosswordStore>);

    impl CrosswordStore for RacedCodeCheck {
        fn live_code_exists(
            &self,
            _code: String,
            _now: OffsetDateTime,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            Box::pin(async { Ok(false) })
        }
        fn insert_room(
            &self,
            room: RoomEntity,
            creator: RoomMemberEntity,
        ) -> BoxFuture<'static, StorageResult<InsertRoomOutcome>> {
            self.0.insert_room(room, creator)
        }
        fn find_room(
            &self,
            code: String,
        ) -> BoxFuture<'static, StorageResult<Option<RoomAggregate>>> {
            self.0.find_room(code)
        }
        fn add_member(
            &self,
            member: RoomMemberEntity,
        ) -> BoxFuture<'static, StorageResult<AddMemberOutcome>> {
            self.0.add_member(member)
        }
        fn remove_member(
            &self,
            code: String,
            user_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.0.remove_member(code, user_id)
        }
        fn set_member_color(
            &self,
            room_id: Uuid,
            user_id: Uuid,
            color: String,
        ) -> BoxFuture<'static, StorageResult<ColorChangeOutcome>> {
            self.0.set_member_color(room_id, user_id, color)
        }
        fn is_member(&self, code: String, user_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
            self.0.is_member(code, user_id)
        }
        fn apply_state_patch(
            &self,
            code: String,
            patch: RoomStatePatch,
            now: OffsetDateTime,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.0.apply_state_patch(code, patch, now)
        }
        fn replace_puzzle(
            &self,
            code: String,
            puzzle_id: String,
            puzzle_data: Value,
            now: OffsetDateTime,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.0.replace_puzzle(code, puzzle_id, puzzle_data, now)
        }
        fn purge_expired(&self, cutoff: OffsetDateTime) -> BoxFuture<'static, StorageResult<u64>> {
            self.0.purge_expired(cutoff)
        }
        fn list_saves(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<SaveEntity>>> {
            self.0.list_saves(user_id)
        }
        fn find_save(
            &self,
            user_id: Uuid,
            puzzle_id: String,
        ) -> BoxFuture<'static, StorageResult<Option<SaveEntity>>> {
            self.0.find_save(user_id, puzzle_id)
        }
        fn upsert_save(&self, save: SaveEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.0.upsert_save(save)
        }
        fn delete_save(
            &self,
            user_id: Uuid,
            puzzle_id: String,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.0.delete_save(user_id, puzzle_id)
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.0.health_check()
        }
    }

    #[tokio::test]
    async fn code_taken_at_insert_is_retried_with_a_new_code() {
        let sqlite = SqliteStore::connect(SqliteConfig::in_memory())
            .await
            .unwrap();
        let harness =
            Harness::with_store(AppConfig::default(), Arc::new(RacedCodeCheck(Arc::new(sqlite))))
                .await;
        let taken = create(&harness, Uuid::new_v4()).await;
        let fresh = RoomCode::parse("FRESH2").unwrap();

        let mut candidates = vec![fresh.clone(), taken.clone(), taken.clone()];
        let room = create_room_with(
            &harness.state,
            Uuid::new_v4(),
            "second",
            "2024-01-02".into(),
            puzzle(),
            || candidates.pop().unwrap_or_else(|| taken.clone()),
        )
        .await
        .unwrap();
        assert_eq!(room.code, fresh.as_str());

        let mut attempts = 0;
        let result = create_room_with(
            &harness.state,
            Uuid::new_v4(),
            "third",
            "2024-01-03".into(),
            puzzle(),
            || {
                attempts += 1;
                taken.clone()
            },
        )
        .await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));
        assert_eq!(attempts, MAX_CODE_ATTEMPTS);
        assert_eq!(
            get_room(&harness.state, &taken).await.unwrap().members.len(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_on_file_database_end_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("rooms.db").display());
        let harness =
            Harness::with_sqlite(AppConfig::default(), SqliteConfig::from_url(&url).unwrap())
                .await;
        let capacity = usize::from(harness.state.config().max_members());

        for _ in 0..5 {
            let code = create(&harness, Uuid::new_v4()).await;

            let joins: Vec<_> = (0..8)
                .map(|index| {
                    let state = harness.state.clone();
                    let code = code.clone();
                    tokio::spawn(async move {
                        join_room(&state, &code, Uuid::new_v4(), &format!("guest {index}")).await
                    })
                })
                .collect();

            let (mut joined, mut full) = (0, 0);
            for join in joins {
                match join.await.unwrap() {
                    Ok(_) => joined += 1,
                    Err(ServiceError::Full(_)) => full += 1,
                    Err(other) => panic!("unexpected join outcome: {other:?}"),
                }
            }
            assert_eq!(joined, capacity - 1);
            assert_eq!(full, 8 - (capacity - 1));

            let room = get_room(&harness.state, &code).await.unwrap();
            assert_eq!(room.members.len(), capacity);
            let mut colors: Vec<_> = room.members.iter().map(|member| member.color.clone()).collect();
            colors.sort();
            colors.dedup();
            assert_eq!(colors.len(), capacity);
        }
    }
}
