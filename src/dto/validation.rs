//! Validation helpers for DTOs.

use serde_json::Value;
use validator::ValidationError;

/// Largest accepted serialized puzzle payload, in bytes.
pub const MAX_PUZZLE_DATA_BYTES: usize = 500 * 1024;

/// Whether `color` is `#` followed by exactly six hexadecimal digits.
pub fn is_hex_color(color: &str) -> bool {
    color
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Validates a `#RRGGBB` member color.
///
/// # Examples
///
/// ```ignore
/// validate_color("#4A90D9") // Ok
/// validate_color("#4a90d9") // Ok - case is normalized later
/// validate_color("4A90D9")  // Err - missing hash
/// ```
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    if is_hex_color(color) {
        return Ok(());
    }

    let mut err = ValidationError::new("color_format");
    err.message = Some("Color must be formatted as #RRGGBB".into());
    Err(err)
}

/// Validates that puzzle content is a JSON object no larger than [`MAX_PUZZLE_DATA_BYTES`].
pub fn validate_puzzle_data(data: &Value) -> Result<(), ValidationError> {
    if !data.is_object() {
        let mut err = ValidationError::new("puzzle_data_shape");
        err.message = Some("Puzzle data must be a JSON object".into());
        return Err(err);
    }

    let size = serde_json::to_vec(data).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
    if size > MAX_PUZZLE_DATA_BYTES {
        let mut err = ValidationError::new("puzzle_data_size");
        err.message = Some(
            format!("Puzzle data must not exceed {MAX_PUZZLE_DATA_BYTES} bytes (got {size})")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates a puzzle identifier: non-blank and at most 200 characters.
pub fn validate_puzzle_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() || id.chars().count() > 200 {
        let mut err = ValidationError::new("puzzle_id");
        err.message = Some("Puzzle ID must contain between 1 and 200 characters".into());
        return Err(err);
    }
    Ok(())
}
