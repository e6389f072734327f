//! Application-level configuration loading, including the member color palette.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration as StdDuration};

use serde::Deserialize;
use time::Duration;
use tracing::{info, warn};

use crate::dto::validation::is_hex_color;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CROSSWORD_BACK_CONFIG_PATH";
const ABLY_API_KEY_ENV: &str = "ABLY_API_KEY";
const JWT_SECRET_ENV: &str = "JWT_SECRET";

const DEFAULT_PALETTE: [&str; 4] = ["#4A90D9", "#E74C3C", "#2ECC71", "#9B59B6"];
const DEFAULT_MAX_MEMBERS: u8 = 4;
const DEFAULT_GRACE_SECS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_TOKEN_TTL_SECS: u64 = 60 * 60;
const DEFAULT_TOKEN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_ABLY_REST_URL: &str = "https://rest.ably.io";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    member_colors: Vec<String>,
    max_members: u8,
    room_ttl: Option<Duration>,
    expired_room_grace: Duration,
    janitor_interval: StdDuration,
    token_ttl: StdDuration,
    token_timeout: StdDuration,
    ably_rest_url: String,
    ably_api_key: Option<String>,
    jwt_secret: Option<String>,
}

impl AppConfig {
    /// Load the configuration file, falling back to built-in defaults, then read secrets from the environment.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        colors = app_config.member_colors.len(),
                        max_members = app_config.max_members,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config
            .with_ably_api_key(non_empty_env(ABLY_API_KEY_ENV))
            .with_jwt_secret(non_empty_env(JWT_SECRET_ENV))
    }

    /// Replace the realtime provider API key (`keyName:keySecret`).
    pub fn with_ably_api_key(mut self, key: Option<String>) -> Self {
        self.ably_api_key = key;
        self
    }

    /// Replace the secret used to verify caller tokens.
    pub fn with_jwt_secret(mut self, secret: Option<String>) -> Self {
        self.jwt_secret = secret;
        self
    }

    /// Replace the realtime REST base URL.
    pub fn with_ably_rest_url(mut self, url: impl Into<String>) -> Self {
        self.ably_rest_url = url.into();
        self
    }

    /// Give newly created rooms a time-to-live.
    pub fn with_room_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.room_ttl = ttl;
        self
    }

    /// Bound the wait on the realtime provider.
    pub fn with_token_timeout(mut self, timeout: StdDuration) -> Self {
        self.token_timeout = timeout;
        self
    }

    /// Return the lowest-index palette color not listed in `used`, if any remains.
    pub fn first_unused_color(&self, used: &[&str]) -> Option<&str> {
        self.member_colors
            .iter()
            .find(|candidate| {
                used.iter()
                    .all(|existing| !existing.eq_ignore_ascii_case(candidate))
            })
            .map(String::as_str)
    }

    /// Palette entry matching `color` regardless of case.
    pub fn palette_color(&self, color: &str) -> Option<&str> {
        self.member_colors
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(color))
            .map(String::as_str)
    }

    /// Ordered member palette.
    pub fn member_colors(&self) -> &[String] {
        &self.member_colors
    }

    /// Capacity given to new rooms; never exceeds the palette size.
    pub fn max_members(&self) -> u8 {
        self.max_members
    }

    /// Time-to-live of new rooms, `None` when rooms never expire.
    pub fn room_ttl(&self) -> Option<Duration> {
        self.room_ttl
    }

    /// How long expired rooms are kept before the janitor deletes them.
    pub fn expired_room_grace(&self) -> Duration {
        self.expired_room_grace
    }

    /// Period of the expired room janitor.
    pub fn janitor_interval(&self) -> StdDuration {
        self.janitor_interval
    }

    /// Lifetime of issued channel tokens.
    pub fn token_ttl(&self) -> StdDuration {
        self.token_ttl
    }

    /// Upper bound on a token request to the realtime provider.
    pub fn token_timeout(&self) -> StdDuration {
        self.token_timeout
    }

    /// Base URL of the realtime provider REST API.
    pub fn ably_rest_url(&self) -> &str {
        &self.ably_rest_url
    }

    /// Realtime provider API key, when configured.
    pub fn ably_api_key(&self) -> Option<&str> {
        self.ably_api_key.as_deref()
    }

    /// Secret used to verify caller tokens, when configured.
    pub fn jwt_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            member_colors: DEFAULT_PALETTE.iter().map(|color| (*color).to_owned()).collect(),
            max_members: DEFAULT_MAX_MEMBERS,
            room_ttl: None,
            expired_room_grace: Duration::seconds(DEFAULT_GRACE_SECS),
            janitor_interval: StdDuration::from_secs(DEFAULT_JANITOR_INTERVAL_SECS),
            token_ttl: StdDuration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            token_timeout: StdDuration::from_millis(DEFAULT_TOKEN_TIMEOUT_MS),
            ably_rest_url: DEFAULT_ABLY_REST_URL.into(),
            ably_api_key: None,
            jwt_secret: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    member_colors: Vec<String>,
    max_members: Option<u8>,
    room_ttl_secs: Option<u64>,
    expired_room_grace_secs: Option<u64>,
    janitor_interval_secs: Option<u64>,
    token_ttl_secs: Option<u64>,
    token_timeout_ms: Option<u64>,
    ably_rest_url: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();

        let mut member_colors: Vec<String> = Vec::new();
        for color in value.member_colors {
            let normalized = color.trim().to_ascii_uppercase();
            if !is_hex_color(&normalized) {
                warn!(color = %color, "ignoring malformed palette color");
            } else if !member_colors.contains(&normalized) {
                member_colors.push(normalized);
            }
        }
        if member_colors.is_empty() {
            member_colors = defaults.member_colors.clone();
        }

        let palette_size = u8::try_from(member_colors.len()).unwrap_or(u8::MAX);
        let max_members = value
            .max_members
            .unwrap_or(DEFAULT_MAX_MEMBERS)
            .clamp(1, palette_size);

        Self {
            member_colors,
            max_members,
            room_ttl: value.room_ttl_secs.map(seconds),
            expired_room_grace: value
                .expired_room_grace_secs
                .map(seconds)
                .unwrap_or(defaults.expired_room_grace),
            janitor_interval: value
                .janitor_interval_secs
                .filter(|secs| *secs > 0)
                .map(StdDuration::from_secs)
                .unwrap_or(defaults.janitor_interval),
            token_ttl: value
                .token_ttl_secs
                .filter(|secs| *secs > 0)
                .map(StdDuration::from_secs)
                .unwrap_or(defaults.token_ttl),
            token_timeout: value
                .token_timeout_ms
                .filter(|ms| *ms > 0)
                .map(StdDuration::from_millis)
                .unwrap_or(defaults.token_timeout),
            ably_rest_url: value
                .ably_rest_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.ably_rest_url),
            ably_api_key: None,
            jwt_secret: None,
        }
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
