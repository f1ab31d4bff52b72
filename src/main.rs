use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{io, sync::Arc, time::Duration};

use taskgate::{
    auth::{AuthService, TokenService},
    config::Config,
    monitoring::RequestLogger,
    routes::{self, auth::CookiePolicy, health},
    store::{CredentialStore, LogStore, PgCredentialStore, PgLogStore},
};

const DB_CONNECT_ATTEMPTS: u32 = 5;
const DB_RETRY_DELAY: Duration = Duration::from_secs(5);

async fn connect_with_retry(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let mut attempt = 1;
    loop {
        let result = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await;

        match result {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < DB_CONNECT_ATTEMPTS => {
                log::warn!(
                    "Database connection attempt {}/{} failed: {}; retrying in {}s",
                    attempt,
                    DB_CONNECT_ATTEMPTS,
                    e,
                    DB_RETRY_DELAY.as_secs()
                );
                tokio::time::sleep(DB_RETRY_DELAY).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn cors(config: &Config) -> Cors {
    config
        .cors_allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let pool = connect_with_retry(&config.database_url)
        .await
        .map_err(|e| {
            log::error!("Failed to connect to database: {}", e);
            io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string())
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            log::error!("Failed to run migrations: {}", e);
            io::Error::new(io::ErrorKind::Other, e.to_string())
        })?;

    let credentials: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool.clone()));
    let logs: Arc<dyn LogStore> = Arc::new(PgLogStore::new(pool.clone()));
    let auth = web::Data::new(AuthService::new(
        credentials,
        TokenService::from_config(&config),
    ));
    let logs = web::Data::from(logs);
    let pool = web::Data::new(pool);
    let cookie_policy = web::Data::new(CookiePolicy::from_config(&config));

    log::info!(
        "Starting taskgate server at {} ({:?})",
        config.server_url(),
        config.environment
    );

    let server_config = config.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .app_data(auth.clone())
            .app_data(logs.clone())
            .app_data(cookie_policy.clone())
            .wrap(RequestLogger)
            .wrap(cors(&server_config))
            .wrap(Logger::default())
            .service(health::health)
            .service(web::scope("/api").configure(routes::config))
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
