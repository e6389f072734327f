use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{error::ServiceError, state::SharedState};

/// Delete rooms whose expiry is older than the configured grace period.
pub async fn purge_once(state: &SharedState) -> Result<u64, ServiceError> {
    let store = state.require_store().await?;
    let cutoff = state.now() - state.config().expired_room_grace();
    let purged = store.purge_expired(cutoff).await?;

    if purged > 0 {
        info!(purged, "purged expired rooms");
    }
    Ok(purged)
}

/// Periodically purge expired rooms for the lifetime of the process.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().janitor_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match purge_once(&state).await {
            Ok(_) => {}
            Err(ServiceError::Degraded) => debug!("skipping room purge while degraded"),
            Err(err) => warn!(error = %err, "room purge failed"),
        }
    }
}
