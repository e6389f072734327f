use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod rooms;
pub mod saves;
pub mod validation;

fn format_timestamp(instant: OffsetDateTime) -> String {
    instant
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Simple `{ "status": ... }` acknowledgement.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.into(),
        }
    }
}
