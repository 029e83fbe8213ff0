use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{AppError, AppResult};
use crate::models::{BanRecord, Category, CategoryId, TopicSummary, User, UserId, GUEST_ID};
use crate::utils::utc_now;

use super::{AccessControl, AuthorizationOverride, CategoryStore, Depth, UserDirectory};

#[derive(Debug, Default)]
struct CategoryTables {
    categories: BTreeMap<CategoryId, Category>,
    topics: Vec<TopicSummary>,
    locks: HashMap<CategoryId, UserId>,
}

impl CategoryTables {
    fn collect_children(
        &self,
        parent: CategoryId,
        level: u32,
        depth: Depth,
        seen: &mut HashSet<CategoryId>,
        out: &mut Vec<Category>,
    ) {
        if !depth.reaches(level) {
            return;
        }

        for category in self.categories.values().filter(|c| c.parent_id == parent) {
            let Some(id) = category.id else { continue };
            if !seen.insert(id) {
                continue;
            }
            out.push(category.clone());
            self.collect_children(id, level + 1, depth, seen, out);
        }
    }
}

/// Process-wide category table kept in memory.
#[derive(Debug, Default)]
pub struct MemoryCategoryStore {
    tables: RwLock<CategoryTables>,
}

impl MemoryCategoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(categories: impl IntoIterator<Item = Category>) -> AppResult<Self> {
        let store = Self::new();
        for category in categories {
            store.save(&category)?;
        }
        Ok(store)
    }

    pub fn add_topic(&self, topic: TopicSummary) -> AppResult<()> {
        self.write()?.topics.push(topic);
        Ok(())
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, CategoryTables>> {
        self.tables
            .read()
            .map_err(|_| AppError::execution("category table lock poisoned"))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, CategoryTables>> {
        self.tables
            .write()
            .map_err(|_| AppError::execution("category table lock poisoned"))
    }
}

impl CategoryStore for MemoryCategoryStore {
    fn get(&self, id: CategoryId) -> AppResult<Category> {
        self.read()?
            .categories
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("category {id}")))
    }

    fn children(&self, id: CategoryId, depth: Depth) -> AppResult<Vec<Category>> {
        let tables = self.read()?;
        let mut seen = HashSet::from([id]);
        let mut out = Vec::new();
        if depth.includes_self() {
            out.extend(tables.categories.get(&id).cloned());
        }
        tables.collect_children(id, 1, depth, &mut seen, &mut out);
        Ok(out)
    }

    fn save(&self, category: &Category) -> AppResult<Category> {
        let mut tables = self.write()?;
        let mut saved = category.clone();
        let id = match saved.id {
            Some(id) => id,
            None => tables.categories.keys().next_back().copied().unwrap_or(0) + 1,
        };
        saved.id = Some(id);
        tables.categories.insert(id, saved.clone());
        Ok(saved)
    }

    fn delete(&self, id: CategoryId) -> AppResult<()> {
        let mut tables = self.write()?;
        if tables.categories.remove(&id).is_none() {
            return Err(AppError::not_found(format!("category {id}")));
        }
        tables.locks.remove(&id);
        tables.topics.retain(|topic| topic.category_id != id);
        Ok(())
    }

    fn latest_topic(&self, category_id: CategoryId) -> AppResult<Option<TopicSummary>> {
        Ok(self
            .read()?
            .topics
            .iter()
            .filter(|topic| topic.category_id == category_id && topic.is_visible())
            .max_by_key(|topic| topic.last_post_id)
            .cloned())
    }

    fn try_lock(&self, id: CategoryId, actor: UserId) -> AppResult<()> {
        let mut tables = self.write()?;
        if !tables.categories.contains_key(&id) {
            return Err(AppError::not_found(format!("category {id}")));
        }
        match tables.locks.get(&id) {
            Some(&by) if by != actor => Err(AppError::Locked { id, by }),
            _ => {
                tables.locks.insert(id, actor);
                Ok(())
            }
        }
    }

    fn unlock(&self, id: CategoryId) -> AppResult<()> {
        self.write()?.locks.remove(&id);
        Ok(())
    }

    fn locked_by(&self, id: CategoryId) -> AppResult<Option<UserId>> {
        Ok(self.read()?.locks.get(&id).copied())
    }
}

/// User facts held in memory. Built once, then read-only.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserDirectory {
    users: HashMap<UserId, User>,
    bans: HashMap<UserId, BanRecord>,
    moderators: HashMap<UserId, HashSet<Option<CategoryId>>>,
    admins: HashMap<UserId, HashSet<Option<CategoryId>>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.insert(user.id, user);
        self
    }

    pub fn with_ban(mut self, ban: BanRecord) -> Self {
        self.bans.insert(ban.userid, ban);
        self
    }

    /// `category == None` grants global moderation.
    pub fn with_moderator(mut self, userid: UserId, category: Option<CategoryId>) -> Self {
        self.moderators.entry(userid).or_default().insert(category);
        self
    }

    pub fn with_admin(mut self, userid: UserId, category: Option<CategoryId>) -> Self {
        self.admins.entry(userid).or_default().insert(category);
        self
    }

    fn holds(
        grants: &HashMap<UserId, HashSet<Option<CategoryId>>>,
        userid: UserId,
        category: Option<CategoryId>,
    ) -> bool {
        grants
            .get(&userid)
            .map(|scopes| scopes.contains(&None) || (category.is_some() && scopes.contains(&category)))
            .unwrap_or(false)
    }
}

impl UserDirectory for MemoryUserDirectory {
    fn is_banned(&self, userid: UserId) -> AppResult<bool> {
        let now = utc_now();
        Ok(self.bans.get(&userid).map(|ban| ban.is_active_at(now)).unwrap_or(false))
    }

    fn ban_record(&self, userid: UserId) -> AppResult<BanRecord> {
        self.bans
            .get(&userid)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("ban for user {userid}")))
    }

    fn is_moderator(&self, userid: UserId, category: Option<CategoryId>) -> AppResult<bool> {
        if userid == GUEST_ID {
            return Ok(false);
        }
        Ok(Self::holds(&self.admins, userid, category) || Self::holds(&self.moderators, userid, category))
    }

    fn is_admin(&self, userid: UserId, category: Option<CategoryId>) -> AppResult<bool> {
        if userid == GUEST_ID {
            return Ok(false);
        }
        Ok(Self::holds(&self.admins, userid, category))
    }

    fn exists(&self, userid: UserId) -> AppResult<bool> {
        Ok(userid != GUEST_ID && self.users.contains_key(&userid))
    }
}

/// Readable categories: everything public plus per-user grants.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccess {
    public: HashSet<CategoryId>,
    grants: HashMap<UserId, HashSet<CategoryId>>,
}

impl MemoryAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_public(mut self, categories: impl IntoIterator<Item = CategoryId>) -> Self {
        self.public.extend(categories);
        self
    }

    pub fn with_grant(mut self, userid: UserId, category: CategoryId) -> Self {
        self.grants.entry(userid).or_default().insert(category);
        self
    }
}

impl AccessControl for MemoryAccess {
    fn allowed_categories(&self, user: &User) -> AppResult<HashSet<CategoryId>> {
        let mut allowed = self.public.clone();
        if let Some(granted) = self.grants.get(&user.id) {
            allowed.extend(granted.iter().copied());
        }
        Ok(allowed)
    }
}

/// Fixed override answers keyed by category and user.
#[derive(Debug, Clone, Default)]
pub struct StaticOverrides {
    entries: HashMap<(CategoryId, UserId), HashMap<String, bool>>,
}

impl StaticOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, category: CategoryId, userid: UserId, action: impl Into<String>, allowed: bool) -> Self {
        self.entries
            .entry((category, userid))
            .or_default()
            .insert(action.into(), allowed);
        self
    }
}

impl AuthorizationOverride for StaticOverrides {
    fn authorise_actions(&self, category: &Category, userid: UserId) -> AppResult<HashMap<String, bool>> {
        Ok(category
            .id
            .and_then(|id| self.entries.get(&(id, userid)))
            .cloned()
            .unwrap_or_default())
    }
}
