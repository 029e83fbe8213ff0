pub mod authz;
pub mod config;
pub mod db;
pub mod errors;
pub mod forum;
pub mod models;
pub mod store;
pub mod utils;

// Re-export commonly used items for tests
pub use authz::{actions, AuthOutcome, Denial, DenyCode, Reason, RuleKind, RuleTable};
pub use config::ForumConfig;
pub use errors::{AppError, AppResult};
pub use forum::{Aggregate, Forum, ForumServices};
pub use models::{Category, User};
