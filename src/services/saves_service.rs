//! Per-user puzzle saves, independent from rooms.

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::SaveEntity,
    dto::saves::{
        BulkImportRequest, BulkSaveEntry, SaveAck, SaveDetail, SaveRequest, SaveSummary,
    },
    error::ServiceError,
    state::SharedState,
};

/// Saves of `user_id`, most recently played first.
pub async fn list_saves(
    state: &SharedState,
    user_id: Uuid,
) -> Result<Vec<SaveSummary>, ServiceError> {
    let store = state.require_store().await?;
    let saves = store.list_saves(user_id).await?;
    Ok(saves.into_iter().map(SaveSummary::from).collect())
}

pub async fn get_save(
    state: &SharedState,
    user_id: Uuid,
    puzzle_id: &str,
) -> Result<SaveDetail, ServiceError> {
    let store = state.require_store().await?;
    store
        .find_save(user_id, puzzle_id.to_owned())
        .await?
        .map(SaveDetail::from)
        .ok_or_else(|| ServiceError::NotFound("save not found".into()))
}

/// Create or replace the save of `puzzle_id`; the first save time is kept.
pub async fn upsert_save(
    state: &SharedState,
    user_id: Uuid,
    puzzle_id: &str,
    request: SaveRequest,
) -> Result<SaveAck, ServiceError> {
    if puzzle_id.trim().is_empty() {
        return Err(ServiceError::InvalidInput("puzzle id must not be empty".into()));
    }
    let store = state.require_store().await?;
    store
        .upsert_save(to_entity(state, user_id, puzzle_id, request))
        .await?;

    debug!(user_id = %user_id, puzzle_id, "save stored");
    Ok(SaveAck {
        status: "saved".into(),
        puzzle_id: puzzle_id.to_owned(),
    })
}

pub async fn delete_save(
    state: &SharedState,
    user_id: Uuid,
    puzzle_id: &str,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    if !store.delete_save(user_id, puzzle_id.to_owned()).await? {
        return Err(ServiceError::NotFound("save not found".into()));
    }
    Ok(())
}

/// Store every entry that names a puzzle; returns how many were written.
pub async fn bulk_import(
    state: &SharedState,
    user_id: Uuid,
    request: BulkImportRequest,
) -> Result<usize, ServiceError> {
    let store = state.require_store().await?;
    let mut imported = 0;

    for (index, raw) in request.saves.into_iter().enumerate() {
        let entry = match serde_json::from_value::<BulkSaveEntry>(raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(index, error = %err, "skipping unreadable save during import");
                continue;
            }
        };
        let Some(puzzle_id) = entry.puzzle_id.filter(|id| !id.trim().is_empty()) else {
            continue;
        };
        if let Err(err) = entry.save.validate() {
            warn!(index, puzzle_id = %puzzle_id, error = %err, "skipping invalid save during import");
            continue;
        }

        store
            .upsert_save(to_entity(state, user_id, &puzzle_id, entry.save))
            .await?;
        imported += 1;
    }

    info!(user_id = %user_id, imported, "imported saves");
    Ok(imported)
}

fn to_entity(
    state: &SharedState,
    user_id: Uuid,
    puzzle_id: &str,
    request: SaveRequest,
) -> SaveEntity {
    let now = state.now();
    SaveEntity {
        user_id,
        puzzle_id: puzzle_id.to_owned(),
        user_grid: request.user_grid,
        checked_cells: request.checked_cells,
        elapsed_seconds: request.elapsed_seconds,
        is_complete: request.is_complete,
        cells_filled: request.cells_filled,
        total_cells: request.total_cells,
        completion_pct: request.completion_pct,
        puzzle_date: Some(request.puzzle_date).filter(|date| !date.trim().is_empty()),
        created_at: now,
        updated_at: now,
    }
}
