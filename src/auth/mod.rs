//! Authentication core: token issuance, verification and rotation, the request
//! gate middleware, and the request/response types of the auth endpoints.

pub mod claims;
pub mod cookies;
pub mod extractors;
pub mod middleware;
pub mod password;
pub mod service;
pub mod token;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::error::AppError;
use crate::models::{Role, UserView};
use crate::store::StoreError;

pub use claims::{AccessClaims, MalformedPayload, RefreshClaims};
pub use extractors::AuthenticatedUser;
pub use middleware::{Authenticate, RequireRole};
pub use password::{hash_password, verify_password};
pub use service::{authorize, bearer_token, AuthService, Session};
pub use token::TokenService;

lazy_static! {
    // Letters (any script), combining marks, spaces, apostrophes, dots and hyphens.
    pub(crate) static ref NAME_REGEX: regex::Regex =
        regex::Regex::new(r"^[\p{L}\p{M}' .-]*$").unwrap();
}

/// Typed outcome of every failing authentication operation.
#[derive(Debug)]
pub enum AuthError {
    /// No bearer token on the request.
    MissingToken,
    /// Bad signature, expired, or not a JWT.
    InvalidToken,
    /// Validly signed, but the payload does not have the required shape.
    MalformedPayload(&'static str),
    /// Refresh requested without a refresh token.
    MissingRefreshToken,
    /// Refresh token failed verification, is unknown, or was superseded.
    InvalidRefreshToken,
    /// A role check ran without an authenticated identity.
    NotAuthenticated,
    /// Authenticated, but the role is not allowed.
    InsufficientRole,
    InvalidCredentials,
    UserExists,
    Store(StoreError),
    Internal(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "missing bearer token"),
            AuthError::InvalidToken => write!(f, "invalid or expired token"),
            AuthError::MalformedPayload(reason) => write!(f, "malformed token payload: {}", reason),
            AuthError::MissingRefreshToken => write!(f, "missing refresh token"),
            AuthError::InvalidRefreshToken => write!(f, "invalid refresh token"),
            AuthError::NotAuthenticated => write!(f, "not authenticated"),
            AuthError::InsufficientRole => write!(f, "insufficient role"),
            AuthError::InvalidCredentials => write!(f, "invalid credentials"),
            AuthError::UserExists => write!(f, "user already exists"),
            AuthError::Store(e) => write!(f, "{}", e),
            AuthError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StoreError> for AuthError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::DuplicateEmail => AuthError::UserExists,
            other => AuthError::Store(other),
        }
    }
}

/// 401 when no credential was presented, 403 when one was presented but is
/// not acceptable, 500 when a collaborator failed.
impl From<AuthError> for AppError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::MissingToken => {
                AppError::Unauthorized("Authentication token is required".into())
            }
            AuthError::InvalidToken => AppError::Forbidden("Invalid or expired token".into()),
            AuthError::MalformedPayload(_) => {
                AppError::Forbidden("Invalid or malformed token payload".into())
            }
            AuthError::MissingRefreshToken => {
                AppError::Unauthorized("Refresh token is required".into())
            }
            AuthError::InvalidRefreshToken => AppError::Forbidden("Invalid refresh token".into()),
            AuthError::NotAuthenticated => AppError::Unauthorized("Authentication required".into()),
            AuthError::InsufficientRole => AppError::Forbidden("Access forbidden".into()),
            AuthError::InvalidCredentials => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::UserExists => AppError::BadRequest("User already exists".into()),
            AuthError::Store(e) => AppError::from(e),
            AuthError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

/// Payload of a login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 72))]
    pub password: String,
}

/// Payload of a registration request. `role` defaults to `USER`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    /// bcrypt only looks at the first 72 bytes.
    #[validate(length(min = 1, max = 72))]
    pub password: String,
    #[serde(default)]
    #[validate(
        length(max = 100),
        regex(path = "NAME_REGEX", message = "Name contains invalid characters")
    )]
    pub first_name: String,
    #[serde(default)]
    #[validate(
        length(max = 100),
        regex(path = "NAME_REGEX", message = "Name contains invalid characters")
    )]
    pub last_name: String,
    #[serde(default)]
    pub role: Role,
}

/// Optional body of the refresh endpoint, for clients that cannot use the cookie.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Response of register, login and refresh.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserView,
    /// Access token for the `Authorization: Bearer` header.
    pub token: String,
    pub refresh_token: String,
}

impl From<Session> for AuthResponse {
    fn from(session: Session) -> Self {
        Self {
            user: UserView::from(session.identity),
            token: session.access_token,
            refresh_token: session.refresh_token,
        }
    }
}
