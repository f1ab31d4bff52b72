use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;

use super::claims::{AccessClaims, RefreshClaims};
use super::AuthError;
use crate::config::Config;
use crate::models::Identity;

/// Lifetime of an access token.
pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
/// Lifetime of a refresh token, and max age of the refresh cookie.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Clone)]
struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and verifies the two token kinds. Access and refresh tokens are
/// signed with independent secrets, so neither can stand in for the other.
#[derive(Clone)]
pub struct TokenService {
    access: SigningKey,
    refresh: SigningKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access: SigningKey::from_secret(access_secret),
            refresh: SigningKey::from_secret(refresh_secret),
            access_ttl: Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
            refresh_ttl: Duration::days(REFRESH_TOKEN_TTL_DAYS),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.access_token_secret, &config.refresh_token_secret)
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access_token(&self, identity: &Identity) -> Result<String, AuthError> {
        self.issue_access_token_at(identity, Utc::now())
    }

    /// Issues an access token as if minted at `issued_at`.
    pub fn issue_access_token_at(
        &self,
        identity: &Identity,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = AccessClaims::for_identity(identity, issued_at, self.access_ttl);
        encode(&Header::default(), &claims, &self.access.encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to sign access token: {}", e)))
    }

    pub fn issue_refresh_token(&self, identity: &Identity) -> Result<String, AuthError> {
        self.issue_refresh_token_at(identity, Utc::now())
    }

    pub fn issue_refresh_token_at(
        &self,
        identity: &Identity,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = RefreshClaims::for_identity(identity, issued_at, self.refresh_ttl);
        encode(&Header::default(), &claims, &self.refresh.encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to sign refresh token: {}", e)))
    }

    /// Checks signature and expiry, then runs the structural guard.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let payload = decode_payload(token, &self.access.decoding).map_err(|e| {
            log::debug!("Access token rejected: {}", e);
            AuthError::InvalidToken
        })?;
        AccessClaims::from_payload(payload).map_err(|reason| {
            log::warn!("Access token with valid signature failed the payload guard: {}", reason);
            AuthError::MalformedPayload(reason.0)
        })
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let payload = decode_payload(token, &self.refresh.decoding).map_err(|e| {
            log::debug!("Refresh token rejected: {}", e);
            AuthError::InvalidRefreshToken
        })?;
        RefreshClaims::from_payload(payload).map_err(|reason| {
            log::warn!("Refresh token failed the payload guard: {}", reason);
            AuthError::InvalidRefreshToken
        })
    }
}

/// Decodes into an untyped JSON value so a payload with the wrong shape is
/// reported by the guard rather than as a deserialization error.
fn decode_payload(token: &str, key: &DecodingKey) -> Result<Value, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    decode::<Value>(token, key, &validation).map(|data| data.claims)
}
