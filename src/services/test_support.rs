use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use time::{OffsetDateTime, macros::datetime};

use crate::{
    config::AppConfig,
    dao::store::{
        CrosswordStore,
        sqlite::{SqliteConfig, SqliteStore},
    },
    realtime::{ChannelToken, ChannelTokenIssuer, DisabledTokenIssuer, TokenError},
    state::{AppState, ManualClock, SharedState},
};

pub(crate) const START: OffsetDateTime = datetime!(2024-01-01 12:00 UTC);

/// Issuer that records every request and answers with a canned token.
#[derive(Default)]
pub(crate) struct RecordingIssuer {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingIssuer {
    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ChannelTokenIssuer for RecordingIssuer {
    fn issue(
        &self,
        client_id: String,
        channel: String,
    ) -> BoxFuture<'static, Result<ChannelToken, TokenError>> {
        self.calls
            .lock()
            .unwrap()
            .push((client_id.clone(), channel.clone()));
        Box::pin(async move {
            Ok(ChannelToken {
                token: format!("token-for-{channel}"),
                issued: 0,
                expires: 3_600_000,
                capability: format!(r#"{{"{channel}":["publish","subscribe","presence"]}}"#),
                client_id: Some(client_id),
            })
        })
    }
}

/// Application state over an in-memory store and a manual clock.
pub(crate) struct Harness {
    pub state: SharedState,
    pub clock: Arc<ManualClock>,
    pub issuer: Arc<RecordingIssuer>,
}

impl Harness {
    pub(crate) async fn new(config: AppConfig) -> Self {
        Self::with_sqlite(config, SqliteConfig::in_memory()).await
    }

    /// Harness over a SQLite database opened from `sqlite`, e.g. a file for race tests.
    pub(crate) async fn with_sqlite(config: AppConfig, sqlite: SqliteConfig) -> Self {
        let store = SqliteStore::connect(sqlite).await.expect("sqlite store");
        Self::with_store(config, Arc::new(store)).await
    }

    pub(crate) async fn with_store(config: AppConfig, store: Arc<dyn CrosswordStore>) -> Self {
        let issuer = Arc::new(RecordingIssuer::default());
        Self::build(config, issuer.clone(), issuer, store).await
    }

    pub(crate) async fn with_disabled_issuer(config: AppConfig) -> Self {
        let store = SqliteStore::connect(SqliteConfig::in_memory())
            .await
            .expect("in-memory store");
        Self::build(
            config,
            Arc::new(DisabledTokenIssuer),
            Arc::new(RecordingIssuer::default()),
            Arc::new(store),
        )
        .await
    }

    async fn build(
        config: AppConfig,
        installed: Arc<dyn ChannelTokenIssuer>,
        issuer: Arc<RecordingIssuer>,
        store: Arc<dyn CrosswordStore>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let state = AppState::with_clock(config, installed, clock.clone());
        state.install_store(store).await;

        Self {
            state,
            clock,
            issuer,
        }
    }
}
