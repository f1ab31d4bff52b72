use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Severity of a request log entry.
/// Corresponds to the `log_level` SQL enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "log_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// 5xx is an error, 4xx a warning, everything else informational.
    pub fn for_status(status: u16) -> Self {
        match status {
            500.. => LogLevel::Error,
            400..=499 => LogLevel::Warn,
            _ => LogLevel::Info,
        }
    }
}

/// One recorded HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub path: String,
    pub method: String,
    pub status_code: i32,
    pub user_id: Option<Uuid>,
    pub user_role: Option<String>,
    pub duration_ms: f64,
    pub error: Option<String>,
}

impl RequestLog {
    pub fn new(method: &str, path: &str, status_code: u16, duration_ms: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: LogLevel::for_status(status_code),
            message: format!("{} {} {}", method, path, status_code),
            path: path.to_string(),
            method: method.to_string(),
            status_code: i32::from(status_code),
            user_id: None,
            user_role: None,
            duration_ms,
            error: None,
        }
    }
}

/// Query-string filters of the log listing endpoint.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub level: Option<LogLevel>,
    pub status_code: Option<i32>,
    pub path: Option<String>,
    pub method: Option<String>,
}

/// A `LogQuery` with its time window resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFilter {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub level: Option<LogLevel>,
    pub status_code: Option<i32>,
    pub path: Option<String>,
    pub method: Option<String>,
}

impl LogFilter {
    /// Missing bounds default to the 24 hours before `now`.
    pub fn resolve(query: LogQuery, now: DateTime<Utc>) -> Self {
        Self {
            start: query.start_date.unwrap_or(now - Duration::hours(24)),
            end: query.end_date.unwrap_or(now),
            level: query.level,
            status_code: query.status_code,
            path: query.path.filter(|p| !p.is_empty()),
            method: query.method.map(|m| m.to_ascii_uppercase()),
        }
    }

    pub fn matches(&self, entry: &RequestLog) -> bool {
        entry.timestamp >= self.start
            && entry.timestamp <= self.end
            && self.level.map_or(true, |level| entry.level == level)
            && self.status_code.map_or(true, |code| entry.status_code == code)
            && self
                .path
                .as_deref()
                .map_or(true, |path| entry.path.contains(path))
            && self
                .method
                .as_deref()
                .map_or(true, |method| entry.method == method)
    }
}
