use crate::{
    auth::{
        cookies::{refresh_cookie, refresh_token_from, removal_cookie},
        AuthError, AuthResponse, AuthService, Authenticate, AuthenticatedUser, LoginRequest,
        RefreshRequest, RegisterRequest, Session,
    },
    config::Config,
    error::AppError,
    models::UserView,
};
use actix_web::{get, post, web, HttpMessage, HttpRequest, HttpResponse, HttpResponseBuilder};
use serde_json::json;
use validator::Validate;

/// Attributes of the refresh-token cookie that depend on the deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookiePolicy {
    /// Adds the `Secure` attribute; on in production.
    pub secure: bool,
}

impl CookiePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            secure: config.environment.is_production(),
        }
    }
}

fn session_response(
    mut builder: HttpResponseBuilder,
    session: Session,
    policy: &CookiePolicy,
) -> HttpResponse {
    builder
        .cookie(refresh_cookie(&session.refresh_token, policy.secure))
        .json(AuthResponse::from(session))
}

/// The `refreshToken` cookie, else the `refreshToken` field of a JSON body.
fn presented_refresh_token(
    req: &HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
) -> Option<String> {
    refresh_token_from(req)
        .or_else(|| body.and_then(|json| json.into_inner().refresh_token))
        .filter(|token| !token.is_empty())
}

/// Register a new user
///
/// Creates the account and opens its first session: 201 with the user, an
/// access token and a refresh token, plus the refresh cookie.
#[post("/register")]
pub async fn register(
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
    register_data: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    register_data.validate()?;

    let session = auth.register(register_data.into_inner()).await?;

    Ok(session_response(HttpResponse::Created(), session, &policy))
}

/// Login user
///
/// Verifies the credentials and replaces the stored refresh token.
#[post("/login")]
pub async fn login(
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
    login_data: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    login_data.validate()?;

    let session = auth.login(&login_data.email, &login_data.password).await?;

    Ok(session_response(HttpResponse::Ok(), session, &policy))
}

/// Rotate the refresh token
///
/// Reads the token from the `refreshToken` cookie, falling back to a JSON
/// body `{"refreshToken": ...}`. The presented token stops being valid.
#[post("/refresh-token")]
pub async fn refresh_token(
    req: HttpRequest,
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
    body: Option<web::Json<RefreshRequest>>,
) -> Result<HttpResponse, AppError> {
    let presented =
        presented_refresh_token(&req, body).ok_or(AuthError::MissingRefreshToken)?;

    let session = auth.rotate_refresh_token(&presented).await?;

    Ok(session_response(HttpResponse::Ok(), session, &policy))
}

/// Logout user
///
/// The session is identified by the presented refresh token, so logging out
/// still works after the access token expired. Without a refresh token a
/// valid bearer token is required. The cookie is cleared either way.
#[post("/logout")]
pub async fn logout(
    req: HttpRequest,
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
    body: Option<web::Json<RefreshRequest>>,
) -> Result<HttpResponse, AppError> {
    match presented_refresh_token(&req, body) {
        Some(token) => auth.revoke_refresh_token(&token).await?,
        None => {
            let claims = auth.authenticate(req.headers())?;
            auth.revoke(claims.id).await?;
            req.extensions_mut().insert(claims);
        }
    }

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(policy.secure))
        .json(json!({ "message": "Logged out successfully" })))
}

/// Current user's profile
#[get("/profile", wrap = "Authenticate")]
pub async fn profile(
    auth: web::Data<AuthService>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let identity = auth
        .store()
        .find_by_id(user.0.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(HttpResponse::Ok().json(UserView::from(identity)))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(register)
        .service(login)
        .service(refresh_token)
        .service(logout)
        .service(profile);
}
