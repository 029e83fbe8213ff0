//! Collaborator contracts consumed by the forum session.
//!
//! Every call is a fallible boundary: storage faults surface as
//! [`AppError::Execution`](crate::errors::AppError::Execution) (or
//! `Database`), missing records as `NotFound`. The session never retries.

mod memory;
mod snapshot;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::ForumConfig;
use crate::errors::AppResult;
use crate::models::{BanRecord, Category, CategoryId, TopicSummary, User, UserId};

pub use memory::{MemoryAccess, MemoryCategoryStore, MemoryUserDirectory, StaticOverrides};
pub use snapshot::{EditLock, OverrideEntry, ReadGrant, RoleGrant, Snapshot};

/// How far below a category a children query reaches. Only
/// [`Depth::UnlimitedWithSelf`] puts the parent itself into the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Immediate,
    Levels(u32),
    Unlimited,
    UnlimitedWithSelf,
}

impl Depth {
    /// Maps the numeric convention: 0 is the whole subtree including the
    /// parent, negative is every descendant, 1 immediate children.
    pub fn from_levels(levels: i32) -> Self {
        match levels {
            0 => Depth::UnlimitedWithSelf,
            1 => Depth::Immediate,
            n if n > 1 => Depth::Levels(n as u32),
            _ => Depth::Unlimited,
        }
    }

    /// Whether a node `level` steps below the parent (1 = child) is included.
    pub fn reaches(&self, level: u32) -> bool {
        match self {
            Depth::Immediate => level <= 1,
            Depth::Levels(max) => level <= *max,
            Depth::Unlimited | Depth::UnlimitedWithSelf => true,
        }
    }

    pub fn includes_self(&self) -> bool {
        matches!(self, Depth::UnlimitedWithSelf)
    }
}

pub trait CategoryStore: Send + Sync {
    fn get(&self, id: CategoryId) -> AppResult<Category>;

    /// Descendants of `id` in pre-order, siblings sorted by id. `id == 0`
    /// addresses the forum root.
    fn children(&self, id: CategoryId, depth: Depth) -> AppResult<Vec<Category>>;

    /// Persists the category, assigning an id to new records.
    fn save(&self, category: &Category) -> AppResult<Category>;

    fn delete(&self, id: CategoryId) -> AppResult<()>;

    /// Newest published, unmoved topic of the category.
    fn latest_topic(&self, category_id: CategoryId) -> AppResult<Option<TopicSummary>>;

    /// Marks the category as being edited by `actor`. Fails with
    /// `AppError::Locked` when somebody else holds it.
    fn try_lock(&self, id: CategoryId, actor: UserId) -> AppResult<()>;

    fn unlock(&self, id: CategoryId) -> AppResult<()>;

    fn locked_by(&self, id: CategoryId) -> AppResult<Option<UserId>>;
}

pub trait UserDirectory: Send + Sync {
    fn is_banned(&self, userid: UserId) -> AppResult<bool>;

    fn ban_record(&self, userid: UserId) -> AppResult<BanRecord>;

    /// `category == None` asks for global moderator status. Admins count as
    /// moderators.
    fn is_moderator(&self, userid: UserId, category: Option<CategoryId>) -> AppResult<bool>;

    fn is_admin(&self, userid: UserId, category: Option<CategoryId>) -> AppResult<bool>;

    fn exists(&self, userid: UserId) -> AppResult<bool>;
}

/// Source of the readable-category set behind the `read` fast path.
pub trait AccessControl: Send + Sync {
    fn allowed_categories(&self, user: &User) -> AppResult<HashSet<CategoryId>>;
}

/// Plugin hook that may force-deny actions. Only an explicit `false` entry
/// has an effect; missing entries fall through to the rule chain.
pub trait AuthorizationOverride: Send + Sync {
    fn authorise_actions(&self, category: &Category, userid: UserId) -> AppResult<HashMap<String, bool>>;
}

/// Resolves which file extensions a user may upload into a category.
/// `None` means uploads are not allowed at all.
pub trait AttachmentPolicy: Send + Sync {
    fn extensions(&self, category: &Category, user: &User) -> AppResult<Option<Vec<String>>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverrides;

impl AuthorizationOverride for NoOverrides {
    fn authorise_actions(&self, _category: &Category, _userid: UserId) -> AppResult<HashMap<String, bool>> {
        Ok(HashMap::new())
    }
}

/// Upload policy driven by the forum configuration.
#[derive(Debug, Clone)]
pub struct ConfiguredAttachments {
    config: Arc<ForumConfig>,
}

impl ConfiguredAttachments {
    pub fn new(config: Arc<ForumConfig>) -> Self {
        Self { config }
    }
}

impl AttachmentPolicy for ConfiguredAttachments {
    fn extensions(&self, _category: &Category, user: &User) -> AppResult<Option<Vec<String>>> {
        if user.is_guest() && !self.config.guest_uploads {
            return Ok(None);
        }

        let mut extensions: Vec<String> = self
            .config
            .image_extensions
            .iter()
            .chain(self.config.file_extensions.iter())
            .cloned()
            .collect();
        extensions.sort();
        extensions.dedup();

        if extensions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(extensions))
        }
    }
}
