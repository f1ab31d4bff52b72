#![allow(dead_code)]

use actix_web::{
    body::MessageBody,
    cookie::Cookie,
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test, web, App,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;

use taskgate::{
    auth::{AuthService, TokenService},
    monitoring::RequestLogger,
    routes::{self, auth::CookiePolicy, health},
    store::{CredentialStore, LogStore, MemoryCredentialStore, MemoryLogStore, PgCredentialStore},
};

pub const ACCESS_SECRET: &str = "test-access-secret";
pub const REFRESH_SECRET: &str = "test-refresh-secret";
pub const PASSWORD: &str = "pw123";

/// Shared state of one test application, backed by the in-memory stores.
#[derive(Clone)]
pub struct TestState {
    pub auth: web::Data<AuthService>,
    pub logs: Arc<MemoryLogStore>,
    pub log_data: web::Data<dyn LogStore>,
}

impl TestState {
    pub fn new() -> Self {
        Self::with_credentials(Arc::new(MemoryCredentialStore::new()))
    }

    /// Identities live in PostgreSQL, so tasks can reference them.
    pub fn with_pool(pool: &PgPool) -> Self {
        Self::with_credentials(Arc::new(PgCredentialStore::new(pool.clone())))
    }

    fn with_credentials(credentials: Arc<dyn CredentialStore>) -> Self {
        let logs = Arc::new(MemoryLogStore::new());
        let log_store: Arc<dyn LogStore> = logs.clone();

        TestState {
            auth: web::Data::new(AuthService::new(
                credentials,
                TokenService::new(ACCESS_SECRET, REFRESH_SECRET),
            )),
            logs,
            log_data: web::Data::from(log_store),
        }
    }
}

/// The application as `main` assembles it, minus CORS and the access log.
/// Task routes additionally need a pool.
pub async fn init_app(
    state: &TestState,
    pool: Option<PgPool>,
) -> impl Service<actix_http::Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>
{
    test::init_service(
        App::new()
            .app_data(state.auth.clone())
            .app_data(state.log_data.clone())
            .app_data(web::Data::new(CookiePolicy::default()))
            .configure(|cfg| {
                if let Some(pool) = pool {
                    cfg.app_data(web::Data::new(pool));
                }
            })
            .wrap(RequestLogger)
            .service(health::health)
            .service(web::scope("/api").configure(routes::config)),
    )
    .await
}

/// A response with its body decoded. Errors raised by middleware are
/// rendered the same way the server would render them.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub cookies: Vec<Cookie<'static>>,
}

impl TestResponse {
    pub fn cookie(&self, name: &str) -> Option<&Cookie<'static>> {
        self.cookies.iter().find(|cookie| cookie.name() == name)
    }

    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

fn decode(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
    }
}

pub async fn send<S, B>(app: &S, req: actix_http::Request) -> TestResponse
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    match test::try_call_service(app, req).await {
        Ok(res) => {
            let status = res.status();
            let cookies = res
                .response()
                .cookies()
                .map(|cookie| cookie.into_owned())
                .collect();
            let bytes = test::read_body(res).await;
            TestResponse {
                status,
                body: decode(&bytes),
                cookies,
            }
        }
        Err(err) => {
            let res = err.error_response();
            let status = res.status();
            let bytes = actix_web::body::to_bytes(res.into_body())
                .await
                .unwrap_or_default();
            TestResponse {
                status,
                body: decode(&bytes),
                cookies: Vec::new(),
            }
        }
    }
}

/// Registered user: the register response body plus convenience fields.
pub struct Registered {
    pub id: String,
    pub token: String,
    pub refresh_token: String,
    pub body: Value,
}

pub async fn register<S, B>(app: &S, email: &str, role: &str) -> Registered
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/api/users/register")
        .set_json(json!({
            "email": email,
            "password": PASSWORD,
            "firstName": "Test",
            "lastName": "User",
            "role": role
        }))
        .to_request();
    let resp = send(app, req).await;
    assert_eq!(resp.status, StatusCode::CREATED, "register failed: {}", resp.body);

    Registered {
        id: resp.body["user"]["id"].as_str().unwrap_or_default().to_string(),
        token: resp.body["token"].as_str().unwrap_or_default().to_string(),
        refresh_token: resp.body["refreshToken"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        body: resp.body,
    }
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

/// Pool for database-backed tests; `None` when `DATABASE_URL` is unset.
pub async fn test_pool() -> Option<PgPool> {
    dotenv::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {}", error),
    };
    if let Err(error) = sqlx::migrate!("./migrations").run(&pool).await {
        panic!("failed to run migrations: {}", error);
    }

    Some(pool)
}
