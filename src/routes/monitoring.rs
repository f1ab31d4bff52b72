use crate::{
    error::AppError,
    models::{LogFilter, LogQuery},
    store::LogStore,
};
use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;

/// Lists recorded requests, newest first.
///
/// ## Query Parameters:
/// - `startDate`, `endDate` (optional, RFC 3339): the window; defaults to the last 24 hours.
/// - `level` (optional): `info`, `warn` or `error`.
/// - `statusCode` (optional): exact status code.
/// - `path` (optional): substring of the request path.
/// - `method` (optional): HTTP method, case-insensitive.
#[get("/logs")]
pub async fn get_logs(
    logs: web::Data<dyn LogStore>,
    query: web::Query<LogQuery>,
) -> Result<impl Responder, AppError> {
    let filter = LogFilter::resolve(query.into_inner(), Utc::now());
    let entries = logs.query(&filter).await?;

    Ok(HttpResponse::Ok().json(entries))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_logs);
}
