//! Request logging: a middleware that records one [`RequestLog`] per request
//! through the configured [`LogStore`].
//!
//! [`RequestLog`]: crate::models::RequestLog
//! [`LogStore`]: crate::store::LogStore

pub mod middleware;

pub use middleware::RequestLogger;
