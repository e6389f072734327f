use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe storage and report whether the service runs degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let realtime = state.token_issuer().is_enabled();

    match state.require_store().await {
        Ok(store) => match store.health_check().await {
            Ok(()) => HealthResponse::ok(realtime),
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                HealthResponse::degraded(realtime)
            }
        },
        Err(_) => {
            warn!("storage unavailable (degraded mode)");
            HealthResponse::degraded(realtime)
        }
    }
}
