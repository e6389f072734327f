pub mod clock;

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig, dao::store::CrosswordStore, error::ServiceError,
    realtime::ChannelTokenIssuer,
};

pub use self::clock::{Clock, ManualClock, SystemClock};

pub type SharedState = Arc<AppState>;

/// Central application state: the storage handle plus the collaborators every request needs.
///
/// Rooms themselves live only in the store; nothing here caches room data between requests.
pub struct AppState {
    store: RwLock<Option<Arc<dyn CrosswordStore>>>,
    degraded: watch::Sender<bool>,
    config: Arc<AppConfig>,
    token_issuer: Arc<dyn ChannelTokenIssuer>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, token_issuer: Arc<dyn ChannelTokenIssuer>) -> SharedState {
        Self::with_clock(config, token_issuer, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit time source.
    pub fn with_clock(
        config: AppConfig,
        token_issuer: Arc<dyn ChannelTokenIssuer>,
        clock: Arc<dyn Clock>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            degraded: degraded_tx,
            config: Arc::new(config),
            token_issuer,
            clock,
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn CrosswordStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Store handle, or [`ServiceError::Degraded`] while storage is unavailable.
    pub async fn require_store(&self) -> Result<Arc<dyn CrosswordStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn CrosswordStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Issuer of realtime channel capabilities.
    pub fn token_issuer(&self) -> &Arc<dyn ChannelTokenIssuer> {
        &self.token_issuer
    }

    /// Current instant according to the installed clock.
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::store::sqlite::{SqliteConfig, SqliteStore},
        realtime::DisabledTokenIssuer,
    };

    #[tokio::test]
    async fn starts_degraded_until_store_installed() {
        let state = AppState::new(AppConfig::default(), Arc::new(DisabledTokenIssuer));
        let mut watcher = state.degraded_watcher();

        assert!(state.is_degraded());
        assert!(matches!(
            state.require_store().await,
            Err(ServiceError::Degraded)
        ));

        let store = SqliteStore::connect(SqliteConfig::in_memory())
            .await
            .expect("in-memory store");
        state.install_store(Arc::new(store)).await;

        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_store().await.is_ok());

        state.clear_store().await;
        assert!(state.is_degraded());
    }
}
