//! Request-scoped forum session.
//!
//! A [`Forum`] is built per logical unit of work from the process-wide
//! [`ForumServices`]. It memoizes authorization outcomes, rule results,
//! channel sets and aggregates in side tables keyed by category id, so the
//! [`Category`] records themselves stay plain data. Sessions are not `Sync`
//! and must not be shared between requests.

mod aggregate;
mod channels;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::authz::{actions, AuthOutcome, DefaultRuleEvaluator, RuleEvaluator, RuleKind, RuleTable};
use crate::config::ForumConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{Category, CategoryId, TopicSummary, User, UserId};
use crate::store::{
    AccessControl, AttachmentPolicy, AuthorizationOverride, CategoryStore, ConfiguredAttachments, Depth,
    NoOverrides, UserDirectory,
};

pub use aggregate::Aggregate;

/// Collaborators shared by every session of the process.
#[derive(Clone)]
pub struct ForumServices {
    pub config: Arc<ForumConfig>,
    pub rules: Arc<RuleTable>,
    pub evaluator: Arc<dyn RuleEvaluator>,
    pub categories: Arc<dyn CategoryStore>,
    pub users: Arc<dyn UserDirectory>,
    pub access: Arc<dyn AccessControl>,
    pub overrides: Arc<dyn AuthorizationOverride>,
    pub attachments: Arc<dyn AttachmentPolicy>,
}

impl ForumServices {
    pub fn new(
        config: ForumConfig,
        categories: Arc<dyn CategoryStore>,
        users: Arc<dyn UserDirectory>,
        access: Arc<dyn AccessControl>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            attachments: Arc::new(ConfiguredAttachments::new(config.clone())),
            config,
            rules: RuleTable::standard(),
            evaluator: Arc::new(DefaultRuleEvaluator::new()),
            categories,
            users,
            access,
            overrides: Arc::new(NoOverrides),
        }
    }

    pub fn with_rules(mut self, rules: Arc<RuleTable>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_overrides(mut self, overrides: Arc<dyn AuthorizationOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_attachments(mut self, attachments: Arc<dyn AttachmentPolicy>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Opens a session acting on behalf of `myself`.
    pub fn session(&self, myself: User) -> Forum {
        Forum::new(self.clone(), myself)
    }
}

pub(crate) type ChannelSet = IndexMap<Option<CategoryId>, Rc<Category>>;

pub(crate) enum AggregateState {
    Building,
    Built(Rc<Aggregate>),
}

#[derive(Default)]
pub(crate) struct SessionCaches {
    pub(crate) registry: HashMap<CategoryId, Rc<Category>>,
    pub(crate) authorised: HashMap<(CategoryId, UserId), HashMap<String, AuthOutcome>>,
    pub(crate) rules: HashMap<(CategoryId, UserId, RuleKind), AuthOutcome>,
    pub(crate) overrides: HashMap<(CategoryId, UserId), Rc<HashMap<String, bool>>>,
    pub(crate) readable: HashMap<UserId, Rc<HashSet<CategoryId>>>,
    pub(crate) channels: HashMap<CategoryId, HashMap<String, Rc<ChannelSet>>>,
    pub(crate) aggregates: HashMap<CategoryId, AggregateState>,
}

pub struct Forum {
    services: ForumServices,
    myself: User,
    pub(crate) caches: RefCell<SessionCaches>,
}

impl Forum {
    pub fn new(services: ForumServices, myself: User) -> Self {
        Self {
            services,
            myself,
            caches: RefCell::new(SessionCaches::default()),
        }
    }

    /// The user this session acts for; stands in wherever no user is given.
    pub fn myself(&self) -> &User {
        &self.myself
    }

    pub fn services(&self) -> &ForumServices {
        &self.services
    }

    pub fn config(&self) -> &ForumConfig {
        &self.services.config
    }

    /// Loads a category, reusing the instance already seen in this session.
    pub fn category(&self, id: CategoryId) -> AppResult<Rc<Category>> {
        if let Some(found) = self.caches.borrow().registry.get(&id) {
            return Ok(found.clone());
        }

        let loaded = self.services.categories.get(id)?;
        Ok(self.register(loaded))
    }

    pub fn children(&self, id: CategoryId, depth: Depth) -> AppResult<Vec<Rc<Category>>> {
        let loaded = self.services.categories.children(id, depth)?;
        Ok(loaded.into_iter().map(|category| self.register(category)).collect())
    }

    /// Whether the category is still stored. Unsaved categories never are.
    pub fn exists(&self, category: &Category) -> AppResult<bool> {
        let Some(id) = category.id else {
            return Ok(false);
        };
        if self.caches.borrow().registry.contains_key(&id) {
            return Ok(true);
        }

        match self.services.categories.get(id) {
            Ok(found) => {
                self.register(found);
                Ok(true)
            }
            Err(AppError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// `None` for top-level categories.
    pub fn parent(&self, category: &Category) -> AppResult<Option<Rc<Category>>> {
        if category.is_top_level() {
            return Ok(None);
        }
        self.category(category.parent_id).map(Some)
    }

    fn register(&self, category: Category) -> Rc<Category> {
        let Some(id) = category.id else {
            return Rc::new(category);
        };

        self.caches
            .borrow_mut()
            .registry
            .entry(id)
            .or_insert_with(|| Rc::new(category))
            .clone()
    }

    /// Writes the category through the store. Every derived cache of the
    /// session is dropped afterwards.
    pub fn save_category(&self, category: Category) -> AppResult<Rc<Category>> {
        let saved = self.services.categories.save(&category)?;
        tracing::debug!(category_id = ?saved.id, "category saved");
        self.invalidate_all();
        Ok(self.register(saved))
    }

    pub fn delete_category(&self, id: CategoryId) -> AppResult<()> {
        self.services.categories.delete(id)?;
        tracing::debug!(category_id = id, "category deleted");
        self.invalidate_all();
        Ok(())
    }

    /// Drops what depends on access state: readable sets, override answers,
    /// rule and action outcomes, and the per-action channel views.
    pub fn invalidate_access(&self) {
        let mut caches = self.caches.borrow_mut();
        caches.readable.clear();
        caches.overrides.clear();
        caches.rules.clear();
        caches.authorised.clear();
        caches.channels.clear();
    }

    pub fn invalidate_all(&self) {
        self.invalidate_access();
        let mut caches = self.caches.borrow_mut();
        caches.registry.clear();
        caches.aggregates.clear();
    }

    /// Takes the edit lock for `actor`. Unsaved categories cannot be locked
    /// and report `false`.
    pub fn checkout(&self, category: &Category, actor: UserId) -> AppResult<bool> {
        let Some(id) = category.id else {
            return Ok(false);
        };
        self.services.categories.try_lock(id, actor)?;
        Ok(true)
    }

    pub fn checkin(&self, category: &Category) -> AppResult<bool> {
        if let Some(id) = category.id {
            self.services.categories.unlock(id)?;
        }
        Ok(true)
    }

    /// Whether somebody other than `with` holds the edit lock.
    pub fn is_checked_out(&self, category: &Category, with: UserId) -> AppResult<bool> {
        let Some(id) = category.id else {
            return Ok(false);
        };
        Ok(matches!(self.services.categories.locked_by(id)?, Some(by) if by != with))
    }

    /// Picks where a new topic started from `category` should go: the first
    /// channel accepting `topic.create`, else the first such descendant.
    pub fn new_topic_category(&self, category: &Category) -> AppResult<Option<Rc<Category>>> {
        let myself = self.myself.clone();

        for channel in self.channels(category, actions::READ)? {
            if self.is_authorised(&channel, actions::TOPIC_CREATE, &myself)? {
                return Ok(Some(channel));
            }
        }

        let root = category.id.unwrap_or(0);
        for candidate in self.children(root, Depth::Unlimited)? {
            if self.is_authorised(&candidate, actions::TOPIC_CREATE, &myself)? {
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }

    /// Folds a topic change into the category's stored counters and last-post
    /// pointer. Returns the saved category, or `None` when nothing changed.
    pub fn apply_topic_update(
        &self,
        category: &Category,
        topic: &TopicSummary,
        topic_delta: i64,
        post_delta: i64,
    ) -> AppResult<Option<Rc<Category>>> {
        if !topic.exists() {
            return Ok(None);
        }

        let mut updated = category.clone();
        let mut changed = false;

        if topic_delta != 0 || post_delta != 0 {
            updated.num_topics += topic_delta;
            updated.num_posts += post_delta;
            changed = true;
        }

        let newer = updated.last_post_time < topic.last_post_time
            || (updated.last_post_time == topic.last_post_time && updated.last_post_id <= topic.last_post_id);

        if topic.is_visible() && category.id == Some(topic.category_id) && newer {
            updated.last_topic_id = topic.id;
            updated.last_post_id = topic.last_post_id;
            updated.last_post_time = topic.last_post_time;
            changed = true;
        } else if updated.last_topic_id == topic.id {
            let latest = match category.id {
                Some(id) => self.services.categories.latest_topic(id)?,
                None => None,
            };
            match latest {
                Some(latest) => {
                    updated.last_topic_id = latest.id;
                    updated.last_post_id = latest.last_post_id;
                    updated.last_post_time = latest.last_post_time;
                }
                None => {
                    updated.num_topics = 0;
                    updated.num_posts = 0;
                    updated.last_topic_id = 0;
                    updated.last_post_id = 0;
                    updated.last_post_time = 0;
                }
            }
            changed = true;
        }

        if !changed {
            return Ok(None);
        }

        self.save_category(updated).map(Some)
    }

    pub(crate) fn is_moderator_of(&self, category: &Category, user: &User) -> AppResult<bool> {
        if user.is_guest() {
            return Ok(false);
        }
        self.services.users.is_moderator(user.id, category.id)
    }
}
