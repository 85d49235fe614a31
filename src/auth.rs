//! Bearer-token authentication for WebSocket sessions.
//!
//! The credential arrives as a `token` query parameter on the upgrade
//! request. It is decoded and validated before any frame is exchanged; a
//! failure closes the handshake with a policy-violation close code.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::store::{UserDirectory, UserId};

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for token verification
    pub jwt_secret: String,
}

const DEV_SECRET: &str = "codehive-dev-secret-change-me";

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_SECRET.to_string(),
        }
    }
}

impl AuthConfig {
    /// Load auth config from environment variables
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                tracing::warn!("JWT_SECRET not set, using insecure development secret");
                DEV_SECRET.to_string()
            });

        Self { jwt_secret }
    }
}

/// JWT claims carried by access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Errors that terminate a connection attempt
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid token")]
    InvalidToken,

    #[error("token has no subject")]
    MissingSubject,

    #[error("unknown user")]
    UnknownUser,

    #[error("inactive user")]
    InactiveUser,
}

/// The authenticated identity bound to a session for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

/// Validate a bearer token and resolve it to a live user.
pub async fn authenticate(
    config: &AuthConfig,
    users: &dyn UserDirectory,
    token: &str,
) -> Result<Identity, AuthError> {
    if token.trim().is_empty() {
        return Err(AuthError::MissingCredential);
    }

    let key = DecodingKey::from_secret(config.jwt_secret.as_ref());
    let claims = decode::<Claims>(token, &key, &Validation::default())
        .map_err(|_| AuthError::InvalidToken)?
        .claims;

    let subject = claims
        .sub
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::MissingSubject)?;

    let user = users.by_id(&subject).await.ok_or(AuthError::UnknownUser)?;
    if !user.is_active {
        return Err(AuthError::InactiveUser);
    }

    Ok(Identity {
        user_id: user.id,
        username: user.username,
    })
}

/// Mint an access token for a user id. Token issuance belongs to the HTTP
/// auth routes; this lives here so the gate and its tests share one codec.
pub fn issue_token(
    config: &AuthConfig,
    user_id: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_secs();

    let claims = Claims {
        sub: Some(user_id.to_string()),
        exp: now + ttl_secs,
    };

    let key = EncodingKey::from_secret(config.jwt_secret.as_ref());
    encode(&Header::default(), &claims, &key)
}
