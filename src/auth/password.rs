use bcrypt::{hash, verify};
use lazy_static::lazy_static;
use uuid::Uuid;

use super::AuthError;

/// bcrypt work factor.
pub const BCRYPT_COST: u32 = 10;

lazy_static! {
    /// Hash of a random secret nobody knows. Logins for unknown emails verify
    /// against it so they cost the same bcrypt work as a wrong password.
    static ref UNKNOWN_ACCOUNT_HASH: Option<String> =
        hash(Uuid::new_v4().to_string(), BCRYPT_COST).ok();
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hashed_password: &str) -> Result<bool, AuthError> {
    verify(password, hashed_password)
        .map_err(|e| AuthError::Internal(format!("Failed to verify password: {}", e)))
}

/// Runs [`hash_password`] on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_password_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {}", e)))?
}

pub async fn verify_password_blocking(
    password: String,
    hashed_password: String,
) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hashed_password))
        .await
        .map_err(|e| AuthError::Internal(format!("Password verification task failed: {}", e)))?
}

/// Spends one bcrypt verification on behalf of an account that does not
/// exist. Always `Ok(false)` unless the blocking task fails.
pub async fn verify_unknown_account_blocking(password: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || match UNKNOWN_ACCOUNT_HASH.as_deref() {
        Some(dummy) => verify_password(&password, dummy).map(|_| false),
        None => Ok(false),
    })
    .await
    .map_err(|e| AuthError::Internal(format!("Password verification task failed: {}", e)))?
}
