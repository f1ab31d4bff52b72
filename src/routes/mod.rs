pub mod auth;
pub mod health;
pub mod monitoring;
pub mod tasks;
pub mod users;

use actix_web::{error, web, HttpRequest};

use crate::auth::{Authenticate, RequireRole};
use crate::error::AppError;

fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("Rejected JSON payload: {}", err);
    AppError::BadRequest(format!("Invalid request body: {}", err)).into()
}

fn query_error_handler(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Invalid query string: {}", err)).into()
}

fn path_error_handler(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Invalid path parameter: {}", err)).into()
}

/// Routes under `/api`. Expects `web::Data` for `AuthService`, `CookiePolicy`,
/// `dyn LogStore` and `PgPool` (the latter only for tasks).
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .app_data(web::PathConfig::default().error_handler(path_error_handler))
        .service(
            web::scope("/users")
                .configure(auth::config)
                .configure(users::config),
        )
        .service(
            web::scope("/tasks")
                .wrap(Authenticate)
                .configure(tasks::config),
        )
        .service(
            web::scope("/monitoring")
                .wrap(RequireRole::admin())
                .wrap(Authenticate)
                .configure(monitoring::config),
        );
}
