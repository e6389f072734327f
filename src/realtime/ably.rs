use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{ChannelToken, ChannelTokenIssuer, TokenError};

const CHANNEL_RIGHTS: [&str; 3] = ["publish", "subscribe", "presence"];

/// Token issuer backed by the Ably REST `requestToken` endpoint.
#[derive(Clone)]
pub struct AblyTokenIssuer {
    client: Client,
    base_url: String,
    key_name: String,
    key_secret: String,
    ttl: Duration,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenParams<'a> {
    key_name: &'a str,
    client_id: &'a str,
    capability: String,
    ttl: u64,
    timestamp: i64,
}

impl AblyTokenIssuer {
    /// Build an issuer from a `keyName:keySecret` API key.
    pub fn new(
        api_key: &str,
        base_url: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Self, TokenError> {
        let (key_name, key_secret) = api_key
            .split_once(':')
            .filter(|(name, secret)| !name.is_empty() && !secret.is_empty())
            .ok_or(TokenError::InvalidKey)?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TokenError::Request)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            key_name: key_name.to_owned(),
            key_secret: key_secret.to_owned(),
            ttl,
            timeout,
        })
    }

    async fn request_token(&self, client_id: &str, channel: &str) -> Result<ChannelToken, TokenError> {
        let params = TokenParams {
            key_name: &self.key_name,
            client_id,
            capability: capability(channel),
            ttl: u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX),
            timestamp: (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
        };
        let url = format!("{}/keys/{}/requestToken", self.base_url, self.key_name);

        let response = self
            .client
            .post(url)
            .basic_auth(&self.key_name, Some(&self.key_secret))
            .json(&params)
            .send()
            .await
            .map_err(TokenError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<ChannelToken>().await.map_err(TokenError::Decode)
    }
}

/// Capability map granting [`CHANNEL_RIGHTS`] on `channel` only.
fn capability(channel: &str) -> String {
    let mut grants = Map::new();
    grants.insert(channel.to_owned(), json!(CHANNEL_RIGHTS));
    Value::Object(grants).to_string()
}

impl ChannelTokenIssuer for AblyTokenIssuer {
    fn issue(
        &self,
        client_id: String,
        channel: String,
    ) -> BoxFuture<'static, Result<ChannelToken, TokenError>> {
        let issuer = self.clone();
        Box::pin(async move {
            let limit = issuer.timeout;
            match timeout(limit, issuer.request_token(&client_id, &channel)).await {
                Ok(Ok(token)) => {
                    debug!(channel = %channel, client_id = %client_id, "issued realtime token");
                    Ok(token)
                }
                Ok(Err(err)) => {
                    warn!(channel = %channel, error = %err, "realtime token request failed");
                    Err(err)
                }
                Err(_) => {
                    warn!(channel = %channel, timeout = ?limit, "realtime token request timed out");
                    Err(TokenError::Timeout(limit))
                }
            }
        })
    }
}
