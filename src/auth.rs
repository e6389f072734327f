//! Caller identity extracted from a bearer token.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{AppError, ServiceError},
    state::SharedState,
};

/// Claims carried by the HS256 session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User identifier.
    pub sub: String,
    pub email: String,
    /// Display name; clients without one fall back to the email.
    #[serde(default)]
    pub name: Option<String>,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

/// Verify `token` against `secret` and turn its claims into an [`AuthUser`].
pub fn verify_token(token: &str, secret: &str) -> Result<AuthUser, ServiceError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);

    let claims = decode::<Claims>(token, &key, &validation)
        .map_err(|err| {
            debug!(error = %err, "rejected bearer token");
            ServiceError::Unauthorized("invalid or expired token".into())
        })?
        .claims;

    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ServiceError::Unauthorized("invalid subject in token".into()))?;
    let display_name = claims
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| claims.email.clone());

    Ok(AuthUser {
        id,
        email: claims.email,
        display_name,
    })
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config().jwt_secret() else {
            return Err(AppError::ServiceUnavailable(
                "authentication not configured".into(),
            ));
        };
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("not authenticated".into()))?;

        Ok(verify_token(token, secret)?)
    }
}
