//! Capability tokens for the per-room realtime channel.

pub mod ably;

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::AppConfig;

pub use self::ably::AblyTokenIssuer;

/// Channel name a room's members publish and subscribe on.
pub fn channel_name(code: &str) -> String {
    format!("room:{code}")
}

/// Failures of the realtime token provider; none of them is an authorization failure.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No provider credentials are configured.
    #[error("realtime provider not configured")]
    NotConfigured,
    /// The API key is not of the `keyName:keySecret` form.
    #[error("malformed realtime API key")]
    InvalidKey,
    /// The HTTP call could not be completed.
    #[error("realtime token request failed")]
    Request(#[source] reqwest::Error),
    /// The provider answered with a non-success status.
    #[error("realtime provider rejected token request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    /// The provider answer could not be decoded.
    #[error("invalid realtime token response")]
    Decode(#[source] reqwest::Error),
    /// The provider did not answer in time.
    #[error("realtime token request timed out after {0:?}")]
    Timeout(Duration),
}

/// Short-lived capability scoped to a single channel, handed to the client as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelToken {
    pub token: String,
    /// Issue time, Unix milliseconds.
    pub issued: i64,
    /// Expiry time, Unix milliseconds.
    pub expires: i64,
    /// JSON-encoded capability map.
    pub capability: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Issues channel-scoped capability tokens.
///
/// Callers must have checked membership before asking for a token.
pub trait ChannelTokenIssuer: Send + Sync {
    /// Issue a publish/subscribe/presence capability on `channel` for `client_id`.
    fn issue(
        &self,
        client_id: String,
        channel: String,
    ) -> BoxFuture<'static, Result<ChannelToken, TokenError>>;

    /// Whether this issuer can hand out tokens at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Issuer used when no realtime provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTokenIssuer;

impl ChannelTokenIssuer for DisabledTokenIssuer {
    fn issue(
        &self,
        _client_id: String,
        _channel: String,
    ) -> BoxFuture<'static, Result<ChannelToken, TokenError>> {
        Box::pin(async { Err(TokenError::NotConfigured) })
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the issuer described by the configuration, falling back to [`DisabledTokenIssuer`].
pub fn issuer_from_config(config: &AppConfig) -> Arc<dyn ChannelTokenIssuer> {
    let Some(api_key) = config.ably_api_key() else {
        info!("ABLY_API_KEY not set; realtime tokens disabled");
        return Arc::new(DisabledTokenIssuer);
    };

    match AblyTokenIssuer::new(
        api_key,
        config.ably_rest_url(),
        config.token_ttl(),
        config.token_timeout(),
    ) {
        Ok(issuer) => Arc::new(issuer),
        Err(err) => {
            warn!(error = %err, "invalid realtime configuration; realtime tokens disabled");
            Arc::new(DisabledTokenIssuer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_is_scoped_by_room_code() {
        assert_eq!(channel_name("ABC234"), "room:ABC234");
    }

    #[tokio::test]
    async fn disabled_issuer_reports_not_configured() {
        let result = DisabledTokenIssuer
            .issue("user".into(), channel_name("ABC234"))
            .await;
        assert!(matches!(result, Err(TokenError::NotConfigured)));
    }

    #[test]
    fn missing_key_disables_tokens() {
        assert!(!issuer_from_config(&AppConfig::default()).is_enabled());

        let config = AppConfig::default().with_ably_api_key(Some("malformed".into()));
        assert!(!issuer_from_config(&config).is_enabled());

        let config = AppConfig::default().with_ably_api_key(Some("app.key:secret".into()));
        assert!(issuer_from_config(&config).is_enabled());
    }
}
