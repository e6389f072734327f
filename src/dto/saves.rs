//! DTO definitions for per-user puzzle saves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{dao::models::SaveEntity, dto::format_timestamp};

/// Progress on a single puzzle as sent by the client.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct SaveRequest {
    #[serde(alias = "userGrid")]
    #[schema(value_type = Vec<Object>)]
    pub user_grid: Vec<Value>,
    #[serde(alias = "checkedCells")]
    #[schema(value_type = Vec<Object>)]
    pub checked_cells: Vec<Value>,
    #[serde(alias = "elapsedSeconds")]
    pub elapsed_seconds: i64,
    #[serde(alias = "isComplete")]
    pub is_complete: bool,
    #[serde(alias = "cellsFilled")]
    pub cells_filled: i64,
    #[serde(alias = "totalCells")]
    pub total_cells: i64,
    #[serde(alias = "completionPct")]
    pub completion_pct: i64,
    /// Display date of the puzzle; empty means "same as the puzzle id".
    #[serde(alias = "puzzleDate")]
    pub puzzle_date: String,
}

impl Validate for SaveRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for (field, value) in [
            ("elapsed_seconds", self.elapsed_seconds),
            ("cells_filled", self.cells_filled),
            ("total_cells", self.total_cells),
        ] {
            if value < 0 {
                let mut err = ValidationError::new("negative");
                err.message = Some(format!("{field} must not be negative").into());
                errors.add(field, err);
            }
        }
        if !(0..=100).contains(&self.completion_pct) {
            let mut err = ValidationError::new("completion_pct_range");
            err.message = Some("completion_pct must be between 0 and 100".into());
            errors.add("completion_pct", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Legacy saves migrated from client storage in one go.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkImportRequest {
    /// Each entry is a [`SaveRequest`] plus its `puzzle_id`; entries without one are skipped.
    #[schema(value_type = Vec<Object>)]
    pub saves: Vec<Value>,
}

/// One entry of a [`BulkImportRequest`].
#[derive(Debug, Deserialize)]
pub struct BulkSaveEntry {
    #[serde(default, alias = "puzzleId")]
    pub puzzle_id: Option<String>,
    #[serde(flatten)]
    pub save: SaveRequest,
}

/// Number of saves written by a bulk import.
#[derive(Debug, Serialize, ToSchema)]
pub struct ImportResponse {
    pub imported: usize,
}

/// Acknowledgement of a stored save.
#[derive(Debug, Serialize, ToSchema)]
pub struct SaveAck {
    pub status: String,
    pub puzzle_id: String,
}

/// Save metadata, as listed for a user.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveSummary {
    pub puzzle_id: String,
    pub date: String,
    pub date_started: String,
    pub last_played: String,
    pub elapsed_seconds: i64,
    pub is_complete: bool,
    pub cells_filled: i64,
    pub total_cells: i64,
    pub completion_percent: i64,
}

impl From<SaveEntity> for SaveSummary {
    fn from(save: SaveEntity) -> Self {
        Self {
            date: save.puzzle_date.unwrap_or_else(|| save.puzzle_id.clone()),
            puzzle_id: save.puzzle_id,
            date_started: format_timestamp(save.created_at),
            last_played: format_timestamp(save.updated_at),
            elapsed_seconds: save.elapsed_seconds,
            is_complete: save.is_complete,
            cells_filled: save.cells_filled,
            total_cells: save.total_cells,
            completion_percent: save.completion_pct,
        }
    }
}

/// Full save, including the grid.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveDetail {
    pub puzzle_id: String,
    #[schema(value_type = Vec<Object>)]
    pub user_grid: Vec<Value>,
    #[schema(value_type = Vec<Object>)]
    pub checked_cells: Vec<Value>,
    pub elapsed_seconds: i64,
    pub is_complete: bool,
    pub cells_filled: i64,
    pub total_cells: i64,
    pub completion_pct: i64,
    pub last_played: String,
}

impl From<SaveEntity> for SaveDetail {
    fn from(save: SaveEntity) -> Self {
        Self {
            puzzle_id: save.puzzle_id,
            user_grid: save.user_grid,
            checked_cells: save.checked_cells,
            elapsed_seconds: save.elapsed_seconds,
            is_complete: save.is_complete,
            cells_filled: save.cells_filled,
            total_cells: save.total_cells,
            completion_pct: save.completion_pct,
            last_played: format_timestamp(save.updated_at),
        }
    }
}
