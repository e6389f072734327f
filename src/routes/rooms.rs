use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use axum_valid::Valid;

use crate::{
    auth::AuthUser,
    dao::models::RoomStatePatch,
    dto::{
        StatusResponse,
        rooms::{
            CreateRoomRequest, JoinResponse, MemberUpdateResponse, RoomStateResponse, RoomView,
            SwitchPuzzleRequest, UpdateColorRequest, UpdateStateRequest,
        },
    },
    error::AppError,
    realtime::ChannelToken,
    services::{room_code::RoomCode, room_service},
    state::SharedState,
};

/// Routes handling collaborative rooms.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{code}", get(get_room))
        .route("/api/rooms/{code}/join", post(join_room))
        .route("/api/rooms/{code}/leave", post(leave_room))
        .route("/api/rooms/{code}/color", put(update_color))
        .route("/api/rooms/{code}/puzzle", put(switch_puzzle))
        .route("/api/rooms/{code}/token", post(issue_token))
        .route("/api/rooms/{code}/state", get(get_state).put(update_state))
}

/// Open a room on a puzzle; the caller becomes its first member.
#[utoipa::path(
    post,
    path = "/api/rooms",
    tag = "rooms",
    security(("bearer" = [])),
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomView),
        (status = 400, description = "Invalid puzzle payload"),
        (status = 401, description = "Missing or invalid token"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<Json<RoomView>, AppError> {
    let room = room_service::create_room(
        &state,
        user.id,
        &user.display_name,
        payload.puzzle_id,
        payload.puzzle_data,
    )
    .await?;
    Ok(Json(room))
}

/// Look a room up by its join code.
#[utoipa::path(
    get,
    path = "/api/rooms/{code}",
    tag = "rooms",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "Join code of the room")),
    responses(
        (status = 200, description = "Room", body = RoomView),
        (status = 404, description = "Unknown room"),
        (status = 410, description = "Room expired")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    _user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<RoomView>, AppError> {
    let code = RoomCode::parse(&code)?;
    Ok(Json(room_service::get_room(&state, &code).await?))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{code}/join",
    tag = "rooms",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "Join code of the room")),
    responses(
        (status = 200, description = "Joined, or already a member", body = JoinResponse),
        (status = 404, description = "Unknown room"),
        (status = 409, description = "Room is full"),
        (status = 410, description = "Room expired")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<JoinResponse>, AppError> {
    let code = RoomCode::parse(&code)?;
    let joined = room_service::join_room(&state, &code, user.id, &user.display_name).await?;
    Ok(Json(joined))
}

/// Leave a room; its member color becomes free for the next joiner.
#[utoipa::path(
    post,
    path = "/api/rooms/{code}/leave",
    tag = "rooms",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "Join code of the room")),
    responses(
        (status = 200, description = "Left the room", body = StatusResponse),
        (status = 404, description = "Unknown room or not a member")
    )
)]
pub async fn leave_room(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let code = RoomCode::parse(&code)?;
    room_service::leave_room(&state, &code, user.id).await?;
    Ok(Json(StatusResponse::new("left")))
}

#[utoipa::path(
    put,
    path = "/api/rooms/{code}/color",
    tag = "rooms",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "Join code of the room")),
    request_body = UpdateColorRequest,
    responses(
        (status = 200, description = "Color changed", body = MemberUpdateResponse),
        (status = 400, description = "Malformed color or color outside the palette"),
        (status = 404, description = "Unknown room or caller is not a member"),
        (status = 409, description = "Color already taken"),
        (status = 410, description = "Room expired")
    )
)]
pub async fn update_color(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<UpdateColorRequest>>,
) -> Result<Json<MemberUpdateResponse>, AppError> {
    let code = RoomCode::parse(&code)?;
    let updated =
        room_service::update_member_color(&state, &code, user.id, &payload.color).await?;
    Ok(Json(updated))
}

/// Swap the room's puzzle and reset shared progress.
#[utoipa::path(
    put,
    path = "/api/rooms/{code}/puzzle",
    tag = "rooms",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "Join code of the room")),
    request_body = SwitchPuzzleRequest,
    responses(
        (status = 200, description = "Puzzle switched", body = StatusResponse),
        (status = 400, description = "Invalid puzzle payload"),
        (status = 403, description = "Caller is not a member"),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn switch_puzzle(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<SwitchPuzzleRequest>>,
) -> Result<Json<StatusResponse>, AppError> {
    let code = RoomCode::parse(&code)?;
    room_service::switch_puzzle(
        &state,
        &code,
        user.id,
        payload.puzzle_id,
        payload.puzzle_data,
    )
    .await?;
    Ok(Json(StatusResponse::new("switched")))
}

/// Issue a realtime capability scoped to the room's channel.
#[utoipa::path(
    post,
    path = "/api/rooms/{code}/token",
    tag = "rooms",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "Join code of the room")),
    responses(
        (status = 200, description = "Channel token", body = ChannelToken),
        (status = 403, description = "Caller is not a member"),
        (status = 503, description = "Realtime provider unavailable")
    )
)]
pub async fn issue_token(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<ChannelToken>, AppError> {
    let code = RoomCode::parse(&code)?;
    Ok(Json(
        room_service::issue_channel_token(&state, &code, user.id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{code}/state",
    tag = "rooms",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "Join code of the room")),
    responses(
        (status = 200, description = "Shared progress snapshot", body = RoomStateResponse),
        (status = 403, description = "Caller is not a member"),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn get_state(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<RoomStateResponse>, AppError> {
    let code = RoomCode::parse(&code)?;
    Ok(Json(
        room_service::get_room_state(&state, &code, user.id).await?,
    ))
}

/// Merge the provided fields into the shared progress.
#[utoipa::path(
    put,
    path = "/api/rooms/{code}/state",
    tag = "rooms",
    security(("bearer" = [])),
    params(("code" = String, Path, description = "Join code of the room")),
    request_body = UpdateStateRequest,
    responses(
        (status = 200, description = "State updated", body = StatusResponse),
        (status = 400, description = "Malformed field"),
        (status = 403, description = "Caller is not a member"),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn update_state(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(code): Path<String>,
    Json(payload): Json<UpdateStateRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    let code = RoomCode::parse(&code)?;
    let patch = RoomStatePatch::try_from(payload)?;
    room_service::update_room_state(&state, &code, user.id, patch).await?;
    Ok(Json(StatusResponse::new("updated")))
}
