pub mod request_log;
pub mod task;
pub mod user;

pub use request_log::{LogFilter, LogLevel, LogQuery, RequestLog};
pub use task::{Task, TaskInput, TaskPriority, TaskQuery, TaskStatus, TaskUpdate};
pub use user::{Identity, IdentityChanges, NewIdentity, Role, UserView};
