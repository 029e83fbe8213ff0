//! Authorization module - rule table, rule evaluators and the engine
//!
//! This module implements per-category authorization with:
//! - An immutable table mapping each action to an ordered rule chain
//! - Short-circuit evaluation with per-action and per-rule caches
//! - A fast path for `read` backed by the user's readable-category set
//! - A plugin override that can force-deny actions for non-moderators

mod engine;
mod evaluator;
mod outcome;
mod rules;

pub use evaluator::{DefaultRuleEvaluator, RuleContext, RuleEvaluator};
pub use outcome::{AuthOutcome, Denial, DenyCode, Reason};
pub use rules::{RuleKind, RuleTable};

/// Well-known action names
pub mod actions {
    /// Disables the permission check entirely.
    pub const NONE: &str = "none";
    pub const READ: &str = "read";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const MODERATE: &str = "moderate";
    pub const ADMIN: &str = "admin";

    // Topic
    pub const TOPIC_READ: &str = "topic.read";
    pub const TOPIC_CREATE: &str = "topic.create";
    pub const TOPIC_REPLY: &str = "topic.reply";
    pub const TOPIC_EDIT: &str = "topic.edit";
    pub const TOPIC_MOVE: &str = "topic.move";
    pub const TOPIC_APPROVE: &str = "topic.approve";
    pub const TOPIC_DELETE: &str = "topic.delete";
    pub const TOPIC_UNDELETE: &str = "topic.undelete";
    pub const TOPIC_PERMDELETE: &str = "topic.permdelete";
    pub const TOPIC_FAVORITE: &str = "topic.favorite";
    pub const TOPIC_SUBSCRIBE: &str = "topic.subscribe";
    pub const TOPIC_STICKY: &str = "topic.sticky";
    pub const TOPIC_LOCK: &str = "topic.lock";

    // Poll
    pub const TOPIC_POLL_READ: &str = "topic.poll.read";
    pub const TOPIC_POLL_CREATE: &str = "topic.poll.create";
    pub const TOPIC_POLL_EDIT: &str = "topic.poll.edit";
    pub const TOPIC_POLL_DELETE: &str = "topic.poll.delete";
    pub const TOPIC_POLL_VOTE: &str = "topic.poll.vote";

    // Post
    pub const TOPIC_POST_READ: &str = "topic.post.read";
    pub const TOPIC_POST_REPLY: &str = "topic.post.reply";
    pub const TOPIC_POST_THANKYOU: &str = "topic.post.thankyou";
    pub const TOPIC_POST_UNTHANKYOU: &str = "topic.post.unthankyou";
    pub const TOPIC_POST_EDIT: &str = "topic.post.edit";
    pub const TOPIC_POST_MOVE: &str = "topic.post.move";
    pub const TOPIC_POST_APPROVE: &str = "topic.post.approve";
    pub const TOPIC_POST_DELETE: &str = "topic.post.delete";
    pub const TOPIC_POST_UNDELETE: &str = "topic.post.undelete";
    pub const TOPIC_POST_PERMDELETE: &str = "topic.post.permdelete";

    // Attachment
    pub const TOPIC_POST_ATTACHMENT_READ: &str = "topic.post.attachment.read";
    pub const TOPIC_POST_ATTACHMENT_CREATEIMAGE: &str = "topic.post.attachment.createimage";
    pub const TOPIC_POST_ATTACHMENT_CREATEFILE: &str = "topic.post.attachment.createfile";
    pub const TOPIC_POST_ATTACHMENT_DELETE: &str = "topic.post.attachment.delete";
}
