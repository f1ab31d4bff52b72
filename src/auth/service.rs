use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::claims::AccessClaims;
use super::password::{
    hash_password_blocking, verify_password_blocking, verify_unknown_account_blocking,
};
use super::token::TokenService;
use super::{AuthError, RegisterRequest};
use crate::models::{Identity, NewIdentity, Role};
use crate::store::CredentialStore;

/// A freshly issued token pair and the identity it belongs to.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub identity: Identity,
}

/// Orchestrates credentials, token issuance and refresh-token rotation on top
/// of a [`CredentialStore`].
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Creates an identity and opens its first session. The refresh token is
    /// written in the same insert as the identity.
    pub async fn register(&self, request: RegisterRequest) -> Result<Session, AuthError> {
        if self.store.find_by_email(&request.email).await?.is_some() {
            return Err(AuthError::UserExists);
        }

        let password_hash = hash_password_blocking(request.password).await?;
        let now = Utc::now();
        let provisional = Identity {
            id: Uuid::new_v4(),
            email: request.email,
            password_hash,
            first_name: request.first_name,
            last_name: request.last_name,
            role: request.role,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        let access_token = self.tokens.issue_access_token(&provisional)?;
        let refresh_token = self.tokens.issue_refresh_token(&provisional)?;

        // A concurrent registration with the same email surfaces here as
        // DuplicateEmail, which converts to UserExists.
        let identity = self
            .store
            .insert(NewIdentity {
                id: provisional.id,
                email: provisional.email,
                password_hash: provisional.password_hash,
                first_name: provisional.first_name,
                last_name: provisional.last_name,
                role: provisional.role,
                refresh_token: Some(refresh_token.clone()),
            })
            .await?;

        log::info!("Registered user {} with role {}", identity.id, identity.role.as_str());
        Ok(Session {
            access_token,
            refresh_token,
            identity,
        })
    }

    /// Unknown email and wrong password are indistinguishable to the caller,
    /// in the response and in the bcrypt work spent before answering.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let Some(mut identity) = self.store.find_by_email(email).await? else {
            verify_unknown_account_blocking(password.to_string()).await?;
            return Err(AuthError::InvalidCredentials);
        };

        let matches =
            verify_password_blocking(password.to_string(), identity.password_hash.clone()).await?;
        if !matches {
            log::debug!("Password mismatch for user {}", identity.id);
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.tokens.issue_access_token(&identity)?;
        let refresh_token = self.tokens.issue_refresh_token(&identity)?;
        self.store
            .set_refresh_token(identity.id, &refresh_token)
            .await?;
        identity.refresh_token = Some(refresh_token.clone());

        Ok(Session {
            access_token,
            refresh_token,
            identity,
        })
    }

    /// Reads `Authorization: Bearer <token>` and verifies the access token.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AccessClaims, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
        self.tokens.verify_access_token(token)
    }

    /// Exchanges a live refresh token for a new pair. The presented token must
    /// verify and equal the stored one; the replacement is written with a
    /// compare-and-set, so of two concurrent rotations only one wins.
    pub async fn rotate_refresh_token(&self, presented: &str) -> Result<Session, AuthError> {
        if presented.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }
        let claims = self.tokens.verify_refresh_token(presented)?;

        let mut identity = self
            .store
            .find_by_id(claims.id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;
        if identity.refresh_token.as_deref() != Some(presented) {
            log::warn!("Refresh token for user {} does not match the stored one", identity.id);
            return Err(AuthError::InvalidRefreshToken);
        }

        let access_token = self.tokens.issue_access_token(&identity)?;
        let refresh_token = self.tokens.issue_refresh_token(&identity)?;
        let swapped = self
            .store
            .swap_refresh_token(identity.id, presented, &refresh_token)
            .await?;
        if !swapped {
            log::warn!("Lost refresh token rotation race for user {}", identity.id);
            return Err(AuthError::InvalidRefreshToken);
        }
        identity.refresh_token = Some(refresh_token.clone());

        Ok(Session {
            access_token,
            refresh_token,
            identity,
        })
    }

    /// Ends the identity's session. Revoking twice is not an error.
    pub async fn revoke(&self, id: Uuid) -> Result<(), AuthError> {
        self.store.clear_refresh_token(id).await?;
        Ok(())
    }

    /// Ends the session `presented` belongs to. Needs no access token, so an
    /// expired session can still be closed. A token that is no longer the
    /// stored one changes nothing and is not an error.
    pub async fn revoke_refresh_token(&self, presented: &str) -> Result<(), AuthError> {
        if presented.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }
        let claims = self.tokens.verify_refresh_token(presented)?;

        if !self.store.clear_refresh_token_if(claims.id, presented).await? {
            log::debug!("Refresh token for user {} was already inactive", claims.id);
        }
        Ok(())
    }
}

/// The token of an `Authorization: Bearer <token>` header. Any other scheme,
/// or an empty token, counts as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Role check against the claims attached by authentication.
pub fn authorize(claims: Option<&AccessClaims>, required: &[Role]) -> Result<(), AuthError> {
    let claims = claims.ok_or(AuthError::NotAuthenticated)?;
    if required.contains(&claims.role) {
        Ok(())
    } else {
        Err(AuthError::InsufficientRole)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;
    use actix_web::http::header::HeaderValue;
    use chrono::Duration;

    fn service() -> AuthService {
        AuthService::new(
            Arc::new(MemoryCredentialStore::new()),
            TokenService::new("access-secret", "refresh-secret"),
        )
    }

    fn register_request(email: &str, role: Role) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "pw123".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role,
        }
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[actix_rt::test]
    async fn test_register_persists_refresh_token() {
        let auth = service();
        let session = auth
            .register(register_request("a@x.com", Role::User))
            .await
            .unwrap();

        let stored = auth
            .store()
            .find_by_id(session.identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(session.refresh_token.as_str()));
        assert_ne!(stored.password_hash, "pw123");

        let claims = auth.tokens().verify_access_token(&session.access_token).unwrap();
        assert_eq!(claims.id, session.identity.id);
        assert_eq!(claims.role, Role::User);
    }

    #[actix_rt::test]
    async fn test_register_duplicate_email() {
        let auth = service();
        auth.register(register_request("a@x.com", Role::User))
            .await
            .unwrap();

        let result = auth.register(register_request("a@x.com", Role::Admin)).await;
        assert!(matches!(result, Err(AuthError::UserExists)));
    }

    #[actix_rt::test]
    async fn test_login_overwrites_refresh_token() {
        let auth = service();
        let registered = auth
            .register(register_request("a@x.com", Role::User))
            .await
            .unwrap();

        let session = auth.login("a@x.com", "pw123").await.unwrap();
        assert_ne!(session.refresh_token, registered.refresh_token);

        // The refresh token issued at registration is no longer live.
        let stale = auth.rotate_refresh_token(&registered.refresh_token).await;
        assert!(matches!(stale, Err(AuthError::InvalidRefreshToken)));
    }

    #[actix_rt::test]
    async fn test_login_failures_are_uniform() {
        let auth = service();
        auth.register(register_request("a@x.com", Role::User))
            .await
            .unwrap();

        assert!(matches!(
            auth.login("a@x.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody@x.com", "pw123").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test_log::test(actix_rt::test)]
    async fn test_rotation_and_replay() {
        let auth = service();
        let first = auth
            .register(register_request("a@x.com", Role::User))
            .await
            .unwrap();

        let second = auth.rotate_refresh_token(&first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);
        assert_eq!(second.identity.id, first.identity.id);

        let replay = auth.rotate_refresh_token(&first.refresh_token).await;
        assert!(matches!(replay, Err(AuthError::InvalidRefreshToken)));

        assert!(auth.rotate_refresh_token(&second.refresh_token).await.is_ok());
    }

    #[actix_rt::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let auth = service();
        let session = auth
            .register(register_request("a@x.com", Role::User))
            .await
            .unwrap();

        let (left, right) = tokio::join!(
            auth.rotate_refresh_token(&session.refresh_token),
            auth.rotate_refresh_token(&session.refresh_token)
        );

        let winners = [left.is_ok(), right.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count();
        assert_eq!(winners, 1);
        let loser = if left.is_ok() { right } else { left };
        assert!(matches!(loser, Err(AuthError::InvalidRefreshToken)));
    }

    #[actix_rt::test]
    async fn test_rotation_rejects_bad_input() {
        let auth = service();
        assert!(matches!(
            auth.rotate_refresh_token("").await,
            Err(AuthError::MissingRefreshToken)
        ));
        assert!(matches!(
            auth.rotate_refresh_token("garbage").await,
            Err(AuthError::InvalidRefreshToken)
        ));

        // Validly signed, but for an identity that does not exist.
        let now = Utc::now();
        let ghost = Identity {
            id: Uuid::new_v4(),
            email: "ghost@x.com".to_string(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            role: Role::User,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        let token = auth.tokens().issue_refresh_token(&ghost).unwrap();
        assert!(matches!(
            auth.rotate_refresh_token(&token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[actix_rt::test]
    async fn test_revoke_is_idempotent() {
        let auth = service();
        let session = auth
            .register(register_request("a@x.com", Role::User))
            .await
            .unwrap();

        auth.revoke(session.identity.id).await.unwrap();
        auth.revoke(session.identity.id).await.unwrap();
        auth.revoke(Uuid::new_v4()).await.unwrap();

        assert!(matches!(
            auth.rotate_refresh_token(&session.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[actix_rt::test]
    async fn test_revoke_by_refresh_token() {
        let auth = service();
        let first = auth
            .register(register_request("a@x.com", Role::User))
            .await
            .unwrap();
        let second = auth.rotate_refresh_token(&first.refresh_token).await.unwrap();

        // A superseded token cannot end the current session.
        auth.revoke_refresh_token(&first.refresh_token).await.unwrap();
        let stored = auth.store().find_by_id(first.identity.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some(second.refresh_token.as_str()));

        auth.revoke_refresh_token(&second.refresh_token).await.unwrap();
        auth.revoke_refresh_token(&second.refresh_token).await.unwrap();
        assert!(matches!(
            auth.rotate_refresh_token(&second.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));

        assert!(matches!(
            auth.revoke_refresh_token("").await,
            Err(AuthError::MissingRefreshToken)
        ));
        assert!(matches!(
            auth.revoke_refresh_token(&second.access_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[actix_rt::test]
    async fn test_authenticate_headers() {
        let auth = service();
        let session = auth
            .register(register_request("a@x.com", Role::Admin))
            .await
            .unwrap();

        let claims = auth
            .authenticate(&headers_with(&format!("Bearer {}", session.access_token)))
            .unwrap();
        assert_eq!(claims.role, Role::Admin);

        assert!(matches!(
            auth.authenticate(&HeaderMap::new()),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            auth.authenticate(&headers_with(&format!("Basic {}", session.access_token))),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            auth.authenticate(&headers_with("Bearer ")),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            auth.authenticate(&headers_with("Bearer not.a.token")),
            Err(AuthError::InvalidToken)
        ));

        let stale = auth
            .tokens()
            .issue_access_token_at(&session.identity, Utc::now() - Duration::minutes(20))
            .unwrap();
        assert!(matches!(
            auth.authenticate(&headers_with(&format!("Bearer {}", stale))),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_authorize() {
        let claims = AccessClaims {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            role: Role::User,
            first_name: String::new(),
            last_name: String::new(),
            iat: None,
            exp: 0,
        };

        assert!(authorize(Some(&claims), &[Role::User]).is_ok());
        assert!(authorize(Some(&claims), &[Role::Admin, Role::User]).is_ok());
        assert!(matches!(
            authorize(Some(&claims), &[Role::Admin]),
            Err(AuthError::InsufficientRole)
        ));
        assert!(matches!(
            authorize(None, &[Role::User]),
            Err(AuthError::NotAuthenticated)
        ));
    }
}
