use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::errors::{AppError, AppResult};
use crate::forum::Forum;
use crate::models::{Category, CategoryId, User, UserId};

use super::actions;
use super::evaluator::RuleContext;
use super::outcome::{AuthOutcome, Denial, Reason};
use super::rules::RuleKind;

impl Forum {
    /// `true` iff [`Forum::try_authorise`] allows the action. In read-only
    /// mode everything except `read` is refused without consulting rules.
    pub fn is_authorised(&self, category: &Category, action: &str, user: &User) -> AppResult<bool> {
        if self.config().read_only && action != actions::READ {
            tracing::trace!(action, "read-only mode refuses action");
            return Ok(false);
        }
        Ok(self.try_authorise(category, action, user)?.is_allowed())
    }

    /// Decides whether `user` may perform `action` on `category`.
    ///
    /// Denials come back as [`AuthOutcome::Denied`]. Unknown actions and
    /// collaborator failures are errors.
    pub fn try_authorise(&self, category: &Category, action: &str, user: &User) -> AppResult<AuthOutcome> {
        if action == actions::NONE {
            return Ok(AuthOutcome::Allowed);
        }
        if action == actions::READ {
            return self.authorise_read(category, user);
        }

        let rules = self.services().rules.clone();
        let Some(chain) = rules.chain(action) else {
            tracing::warn!(action, category_id = ?category.id, "unknown action requested");
            return Err(AppError::invalid_action(action));
        };

        let cache_key = category.id.map(|id| (id, user.id));
        if let Some(key) = cache_key {
            let caches = self.caches.borrow();
            if let Some(outcome) = caches.authorised.get(&key).and_then(|by_action| by_action.get(action)) {
                tracing::trace!(user_id = user.id, category_id = key.0, action, "authorization cache hit");
                return Ok(outcome.clone());
            }
        }

        let outcome = match self.override_denial(category, action, user)? {
            Some(denial) => AuthOutcome::Denied(denial),
            None => self.run_chain(category, chain, user)?,
        };

        if let Some(key) = cache_key {
            self.caches
                .borrow_mut()
                .authorised
                .entry(key)
                .or_default()
                .insert(action.to_string(), outcome.clone());
        }

        Ok(outcome)
    }

    /// Throwing form of [`Forum::try_authorise`]: a denial becomes
    /// [`AppError::Denied`].
    pub fn require(&self, category: &Category, action: &str, user: &User) -> AppResult<()> {
        self.try_authorise(category, action, user)?.into_result()
    }

    /// The `read` fast path, backed by the user's readable-category set.
    pub fn authorise_read(&self, category: &Category, user: &User) -> AppResult<AuthOutcome> {
        let Some(id) = category.id else {
            return Ok(AuthOutcome::Denied(Denial::not_found(Reason::NoAccess)));
        };
        if !self.exists(category)? {
            tracing::debug!(category_id = id, "read on missing category");
            return Ok(AuthOutcome::Denied(Denial::not_found(Reason::NoAccess)));
        }

        if self.readable_categories(user)?.contains(&id) {
            return Ok(AuthOutcome::Allowed);
        }

        let known = !user.is_guest() && self.services().users.exists(user.id)?;
        Ok(AuthOutcome::Denied(Denial::for_visitor(!known, Reason::NoAccess)))
    }

    /// Category ids `user` may read, fetched once per session.
    pub fn readable_categories(&self, user: &User) -> AppResult<Rc<HashSet<CategoryId>>> {
        if let Some(found) = self.caches.borrow().readable.get(&user.id) {
            return Ok(found.clone());
        }

        let allowed = Rc::new(self.services().access.allowed_categories(user)?);
        tracing::debug!(user_id = user.id, count = allowed.len(), "loaded readable categories");
        self.caches.borrow_mut().readable.insert(user.id, allowed.clone());
        Ok(allowed)
    }

    fn override_denial(&self, category: &Category, action: &str, user: &User) -> AppResult<Option<Denial>> {
        if self.is_moderator_of(category, user)? || self.is_admin_of(category, user)? {
            return Ok(None);
        }

        let answers = self.override_answers(category, user.id)?;
        if answers.get(action) == Some(&false) {
            tracing::debug!(user_id = user.id, category_id = ?category.id, action, "override denied action");
            return Ok(Some(Denial::for_visitor(user.is_guest(), Reason::NoAccess)));
        }
        Ok(None)
    }

    fn override_answers(&self, category: &Category, userid: UserId) -> AppResult<Rc<HashMap<String, bool>>> {
        let key = category.id.map(|id| (id, userid));
        if let Some(key) = key {
            if let Some(found) = self.caches.borrow().overrides.get(&key) {
                return Ok(found.clone());
            }
        }

        let answers = Rc::new(self.services().overrides.authorise_actions(category, userid)?);
        if let Some(key) = key {
            self.caches.borrow_mut().overrides.insert(key, answers.clone());
        }
        Ok(answers)
    }

    fn run_chain(&self, category: &Category, chain: &[RuleKind], user: &User) -> AppResult<AuthOutcome> {
        for &rule in chain {
            let outcome = self.rule_outcome(category, rule, user)?;
            if !outcome.is_allowed() {
                return Ok(outcome);
            }
        }
        Ok(AuthOutcome::Allowed)
    }

    fn rule_outcome(&self, category: &Category, rule: RuleKind, user: &User) -> AppResult<AuthOutcome> {
        let key = category.id.map(|id| (id, user.id, rule));
        if let Some(key) = key {
            if let Some(found) = self.caches.borrow().rules.get(&key) {
                return Ok(found.clone());
            }
        }

        let evaluator = self.services().evaluator.clone();
        let outcome = evaluator.evaluate(rule, &RuleContext::new(self, category, user))?;

        if let Some(key) = key {
            self.caches.borrow_mut().rules.insert(key, outcome.clone());
        }
        Ok(outcome)
    }

    fn is_admin_of(&self, category: &Category, user: &User) -> AppResult<bool> {
        if user.is_guest() {
            return Ok(false);
        }
        self.services().users.is_admin(user.id, category.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ForumConfig;
    use crate::forum::ForumServices;
    use crate::store::{MemoryAccess, MemoryCategoryStore, MemoryUserDirectory, StaticOverrides};

    fn services() -> ForumServices {
        let categories = MemoryCategoryStore::with_categories([
            Category::new(1, 0, "Section"),
            Category::new(2, 1, "General"),
            Category::new(3, 1, "Staff"),
        ])
        .unwrap();
        let users = MemoryUserDirectory::new()
            .with_user(User::new(5, "ann"))
            .with_user(User::new(8, "mod"))
            .with_moderator(8, Some(2));
        let access = MemoryAccess::new().with_public([1, 2]).with_grant(8, 3);
        let overrides = StaticOverrides::new()
            .with_entry(2, 5, actions::TOPIC_REPLY, false)
            .with_entry(2, 8, actions::TOPIC_REPLY, false)
            .with_entry(2, 5, actions::TOPIC_EDIT, true);

        ForumServices::new(ForumConfig::default(), Arc::new(categories), Arc::new(users), Arc::new(access))
            .with_overrides(Arc::new(overrides))
    }

    #[test]
    fn read_fast_path_codes() {
        let forum = services().session(User::guest());
        let staff = forum.category(3).unwrap();

        let guest = forum.try_authorise(&staff, actions::READ, &User::guest()).unwrap();
        assert_eq!(guest.denial().unwrap().code.as_u16(), 401);

        let ann = forum.try_authorise(&staff, actions::READ, &User::new(5, "ann")).unwrap();
        assert_eq!(ann.denial().unwrap().code.as_u16(), 403);

        // Unregistered ids are treated like guests.
        let ghost = forum.try_authorise(&staff, actions::READ, &User::new(77, "ghost")).unwrap();
        assert_eq!(ghost.denial().unwrap().code.as_u16(), 401);

        assert!(forum.try_authorise(&staff, actions::READ, &User::new(8, "mod")).unwrap().is_allowed());
    }

    #[test]
    fn unsaved_category_is_not_found_for_read() {
        let forum = services().session(User::guest());
        let draft = Category {
            name: "Draft".into(),
            ..Category::default()
        };
        let outcome = forum.try_authorise(&draft, actions::READ, &User::new(5, "ann")).unwrap();
        assert_eq!(outcome.denial().unwrap().code.as_u16(), 404);
    }

    #[test]
    fn override_denies_non_moderators_only() {
        let forum = services().session(User::guest());
        let general = forum.category(2).unwrap();

        let ann = forum.try_authorise(&general, actions::TOPIC_REPLY, &User::new(5, "ann")).unwrap();
        assert_eq!(ann.denial().unwrap().reason, Reason::NoAccess);
        assert_eq!(ann.denial().unwrap().code.as_u16(), 403);

        assert!(forum.is_authorised(&general, actions::TOPIC_REPLY, &User::new(8, "mod")).unwrap());
    }

    #[test]
    fn explicit_true_falls_through_to_rules() {
        let forum = services().session(User::guest());
        let general = forum.category(2).unwrap();
        assert!(forum.is_authorised(&general, actions::TOPIC_EDIT, &User::new(5, "ann")).unwrap());
    }

    #[test]
    fn require_raises_denials() {
        let forum = services().session(User::guest());
        let general = forum.category(2).unwrap();

        let err = forum.require(&general, actions::MODERATE, &User::new(5, "ann")).unwrap_err();
        assert_eq!(err.kind(), "denied");
        assert_eq!(err.status_code(), 403);
        forum.require(&general, actions::MODERATE, &User::new(8, "mod")).unwrap();
    }

    #[test]
    fn unknown_action_is_an_error() {
        let forum = services().session(User::guest());
        let general = forum.category(2).unwrap();
        let err = forum.try_authorise(&general, "topic.teleport", &User::new(5, "ann")).unwrap_err();
        assert!(matches!(err, AppError::InvalidAction(ref a) if a == "topic.teleport"));
    }
}
