#![doc = "The `taskgate` library crate."]
#![doc = ""]
#![doc = "JWT authentication with refresh-token rotation, role-based access control,"]
#![doc = "per-request logging, and the task and user-management APIs built on them."]
#![doc = "The binary (`main.rs`) wires these into an actix-web server."]

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod monitoring;
pub mod routes;
pub mod store;

pub use crate::error::AppError;
