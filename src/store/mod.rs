//! Persistence seams.
//!
//! The authentication core and the admin handlers talk to users through
//! [`CredentialStore`]; the request logger writes through [`LogStore`]. Both
//! traits are object safe so the application can hold them as
//! `Arc<dyn …>` and swap PostgreSQL for the in-memory implementations in tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::fmt;
use uuid::Uuid;

use crate::models::{Identity, IdentityChanges, LogFilter, NewIdentity, RequestLog};

pub use memory::{MemoryCredentialStore, MemoryLogStore};
pub use postgres::{PgCredentialStore, PgLogStore};

#[derive(Debug)]
pub enum StoreError {
    /// The email is already taken by another identity.
    DuplicateEmail,
    /// The backend failed (connection lost, timeout, bad query).
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::DuplicateEmail => write!(f, "email already registered"),
            StoreError::Backend(detail) => write!(f, "store failure: {}", detail),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
                StoreError::DuplicateEmail
            }
            _ => StoreError::Backend(error.to_string()),
        }
    }
}

/// Durable record of identities and their current refresh token.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateEmail`] if the email is taken.
    async fn insert(&self, identity: NewIdentity) -> Result<Identity, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    /// Unconditionally overwrites the stored refresh token.
    async fn set_refresh_token(&self, id: Uuid, token: &str) -> Result<(), StoreError>;

    /// Atomically replaces the stored refresh token with `replacement` only
    /// if it currently equals `expected`. Returns whether the swap happened.
    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, StoreError>;

    /// Clears the stored refresh token. Clearing an empty slot is not an error.
    async fn clear_refresh_token(&self, id: Uuid) -> Result<(), StoreError>;

    /// Clears the stored refresh token only if it equals `expected`. Returns
    /// whether anything was cleared.
    async fn clear_refresh_token_if(&self, id: Uuid, expected: &str) -> Result<bool, StoreError>;

    /// All identities, oldest first.
    async fn list(&self) -> Result<Vec<Identity>, StoreError>;

    /// Returns `None` if no identity has this id.
    async fn update(
        &self,
        id: Uuid,
        changes: IdentityChanges,
    ) -> Result<Option<Identity>, StoreError>;

    /// Returns whether an identity was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Append-only sink of request log entries.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn record(&self, entry: RequestLog) -> Result<(), StoreError>;

    /// Entries matching `filter`, newest first.
    async fn query(&self, filter: &LogFilter) -> Result<Vec<RequestLog>, StoreError>;
}
