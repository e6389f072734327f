use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    auth::AuthUser,
    dto::{
        StatusResponse,
        saves::{BulkImportRequest, ImportResponse, SaveAck, SaveDetail, SaveRequest, SaveSummary},
    },
    error::AppError,
    services::saves_service,
    state::SharedState,
};

/// Routes handling the caller's own puzzle saves.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/saves", get(list_saves))
        .route("/api/saves/bulk", post(bulk_import))
        .route(
            "/api/saves/{*puzzle_id}",
            get(get_save).put(upsert_save).delete(delete_save),
        )
}

#[utoipa::path(
    get,
    path = "/api/saves",
    tag = "saves",
    security(("bearer" = [])),
    responses((status = 200, description = "Saves, most recently played first", body = [SaveSummary]))
)]
pub async fn list_saves(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<Json<Vec<SaveSummary>>, AppError> {
    Ok(Json(saves_service::list_saves(&state, user.id).await?))
}

/// Import saves kept by the client before it had an account.
#[utoipa::path(
    post,
    path = "/api/saves/bulk",
    tag = "saves",
    security(("bearer" = [])),
    request_body = BulkImportRequest,
    responses((status = 200, description = "Number of imported saves", body = ImportResponse))
)]
pub async fn bulk_import(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(payload): Json<BulkImportRequest>,
) -> Result<Json<ImportResponse>, AppError> {
    let imported = saves_service::bulk_import(&state, user.id, payload).await?;
    Ok(Json(ImportResponse { imported }))
}

#[utoipa::path(
    get,
    path = "/api/saves/{puzzle_id}",
    tag = "saves",
    security(("bearer" = [])),
    params(("puzzle_id" = String, Path, description = "Puzzle identifier, may contain slashes")),
    responses(
        (status = 200, description = "Save", body = SaveDetail),
        (status = 404, description = "No save for this puzzle")
    )
)]
pub async fn get_save(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(puzzle_id): Path<String>,
) -> Result<Json<SaveDetail>, AppError> {
    Ok(Json(
        saves_service::get_save(&state, user.id, &puzzle_id).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/saves/{puzzle_id}",
    tag = "saves",
    security(("bearer" = [])),
    params(("puzzle_id" = String, Path, description = "Puzzle identifier, may contain slashes")),
    request_body = SaveRequest,
    responses((status = 200, description = "Save stored", body = SaveAck))
)]
pub async fn upsert_save(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(puzzle_id): Path<String>,
    Valid(Json(payload)): Valid<Json<SaveRequest>>,
) -> Result<Json<SaveAck>, AppError> {
    Ok(Json(
        saves_service::upsert_save(&state, user.id, &puzzle_id, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/saves/{puzzle_id}",
    tag = "saves",
    security(("bearer" = [])),
    params(("puzzle_id" = String, Path, description = "Puzzle identifier, may contain slashes")),
    responses(
        (status = 200, description = "Save deleted", body = StatusResponse),
        (status = 404, description = "No save for this puzzle")
    )
)]
pub async fn delete_save(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(puzzle_id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    saves_service::delete_save(&state, user.id, &puzzle_id).await?;
    Ok(Json(StatusResponse::new("deleted")))
}
