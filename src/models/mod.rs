pub mod category;
pub mod topic;
pub mod user;

pub use category::{Category, CategoryId, CategoryKey, ChannelSpec, HoldState};
pub use topic::TopicSummary;
pub use user::{BanRecord, User, UserId, GUEST_ID};
