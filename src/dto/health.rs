use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: &'static str,
    /// Whether realtime channel tokens can be issued.
    pub realtime: bool,
}

impl HealthResponse {
    /// Storage reachable.
    pub fn ok(realtime: bool) -> Self {
        Self {
            status: "ok",
            realtime,
        }
    }

    /// Running without storage.
    pub fn degraded(realtime: bool) -> Self {
        Self {
            status: "degraded",
            realtime,
        }
    }
}
