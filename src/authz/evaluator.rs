use crate::errors::{AppError, AppResult};
use crate::forum::Forum;
use crate::models::{Category, User};

use super::outcome::{AuthOutcome, DenyCode, Reason};
use super::rules::RuleKind;

/// Everything a rule may look at.
pub struct RuleContext<'a> {
    pub forum: &'a Forum,
    pub category: &'a Category,
    pub user: &'a User,
}

impl<'a> RuleContext<'a> {
    pub fn new(forum: &'a Forum, category: &'a Category, user: &'a User) -> Self {
        Self { forum, category, user }
    }
}

/// Evaluates a single rule of an action chain.
pub trait RuleEvaluator: Send + Sync {
    fn evaluate(&self, rule: RuleKind, ctx: &RuleContext<'_>) -> AppResult<AuthOutcome>;
}

type RuleFn = fn(&RuleContext<'_>) -> AppResult<AuthOutcome>;

/// The forum's built-in rules, dispatched through a fixed table.
#[derive(Debug, Clone, Default)]
pub struct DefaultRuleEvaluator;

impl DefaultRuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn handler(rule: RuleKind) -> RuleFn {
        match rule {
            RuleKind::Read => read,
            RuleKind::NotBanned => not_banned,
            RuleKind::GuestWrite => guest_write,
            RuleKind::Subscribe => subscribe,
            RuleKind::CatSubscribe => cat_subscribe,
            RuleKind::Favorite => favorite,
            RuleKind::NotSection => not_section,
            RuleKind::Channel => channel,
            RuleKind::Unlocked => unlocked,
            RuleKind::Moderate => moderate,
            RuleKind::GlobalModerate => global_moderate,
            RuleKind::Admin => admin,
            RuleKind::Poll => poll,
            RuleKind::Vote => vote,
            RuleKind::Upload => upload,
        }
    }
}

impl RuleEvaluator for DefaultRuleEvaluator {
    fn evaluate(&self, rule: RuleKind, ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
        let outcome = Self::handler(rule)(ctx)?;

        if let AuthOutcome::Denied(denial) = &outcome {
            tracing::debug!(
                user_id = ctx.user.id,
                category_id = ?ctx.category.id,
                rule = %rule,
                code = denial.code.as_u16(),
                reason = denial.reason.key(),
                "rule denied"
            );
        }

        Ok(outcome)
    }
}

fn allow() -> AppResult<AuthOutcome> {
    Ok(AuthOutcome::Allowed)
}

fn deny(code: DenyCode, reason: Reason) -> AppResult<AuthOutcome> {
    Ok(AuthOutcome::deny(code, reason))
}

fn read(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    ctx.forum.authorise_read(ctx.category, ctx.user)
}

fn not_banned(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    let users = &ctx.forum.services().users;
    if !users.is_banned(ctx.user.id)? {
        return allow();
    }

    // A ban without a readable record is treated as permanent.
    let record = match users.ban_record(ctx.user.id) {
        Ok(record) => Some(record),
        Err(AppError::NotFound(_)) => None,
        Err(err) => return Err(err),
    };

    match record.and_then(|record| record.expires_at) {
        Some(expires_at) => deny(DenyCode::Forbidden, Reason::BannedUntil { expires_at }),
        None => deny(DenyCode::Forbidden, Reason::Banned),
    }
}

fn guest_write(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if ctx.user.is_guest() && !ctx.forum.config().pubwrite {
        return deny(DenyCode::Unauthorized, Reason::AnonymousForbidden);
    }
    allow()
}

fn subscribe(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if !ctx.forum.config().topic_subscriptions_enabled() {
        return deny(DenyCode::Forbidden, Reason::SubscriptionsDisabled);
    }
    if ctx.user.is_guest() {
        return deny(DenyCode::Unauthorized, Reason::SubscriptionsDisabled);
    }
    allow()
}

fn cat_subscribe(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if !ctx.forum.config().category_subscriptions_enabled() {
        return deny(DenyCode::Forbidden, Reason::SubscriptionsDisabled);
    }
    if ctx.user.is_guest() {
        return deny(DenyCode::Unauthorized, Reason::SubscriptionsDisabled);
    }
    allow()
}

fn favorite(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if !ctx.forum.config().allowfavorites {
        return deny(DenyCode::Forbidden, Reason::FavoritesDisabled);
    }
    if ctx.user.is_guest() {
        return deny(DenyCode::Unauthorized, Reason::FavoritesDisabled);
    }
    allow()
}

fn not_section(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if ctx.forum.is_section(ctx.category)? {
        return deny(DenyCode::Forbidden, Reason::IsSection);
    }
    allow()
}

fn channel(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if !ctx.forum.is_own_channel(ctx.category)? {
        return deny(DenyCode::Forbidden, Reason::IsAlias);
    }
    allow()
}

fn unlocked(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if ctx.category.locked && (ctx.user.is_guest() || !ctx.forum.is_moderator_of(ctx.category, ctx.user)?) {
        return deny(DenyCode::Forbidden, Reason::CategoryLocked);
    }
    allow()
}

fn moderate(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if ctx.user.is_guest() {
        return deny(DenyCode::Unauthorized, Reason::NotModerator);
    }
    if !ctx.forum.is_moderator_of(ctx.category, ctx.user)? {
        return deny(DenyCode::Forbidden, Reason::NotModerator);
    }
    allow()
}

fn global_moderate(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if ctx.user.is_guest() {
        return deny(DenyCode::Unauthorized, Reason::NotGlobalModerator);
    }
    if !ctx.forum.services().users.is_moderator(ctx.user.id, None)? {
        return deny(DenyCode::Forbidden, Reason::NotGlobalModerator);
    }
    allow()
}

fn admin(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if ctx.user.is_guest() {
        return deny(DenyCode::Unauthorized, Reason::NotAdmin);
    }
    if !ctx.forum.services().users.is_admin(ctx.user.id, ctx.category.id)? {
        return deny(DenyCode::Forbidden, Reason::NotAdmin);
    }
    allow()
}

fn poll(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if !ctx.forum.config().pollenabled {
        return deny(DenyCode::Forbidden, Reason::PollsDisabled);
    }
    if !ctx.category.allow_polls {
        return deny(DenyCode::Forbidden, Reason::PollsNotAllowed);
    }
    allow()
}

fn vote(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    if ctx.user.is_guest() {
        return deny(DenyCode::Unauthorized, Reason::PollLoginRequired);
    }
    allow()
}

fn upload(ctx: &RuleContext<'_>) -> AppResult<AuthOutcome> {
    let extensions = ctx
        .forum
        .services()
        .attachments
        .extensions(ctx.category, ctx.user)?;
    if extensions.is_none() {
        return deny(DenyCode::Forbidden, Reason::UploadNotAllowed);
    }
    allow()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::config::ForumConfig;
    use crate::forum::ForumServices;
    use crate::models::BanRecord;
    use crate::store::{MemoryAccess, MemoryCategoryStore, MemoryUserDirectory};

    fn services(config: ForumConfig, users: MemoryUserDirectory) -> ForumServices {
        let categories = MemoryCategoryStore::with_categories([
            Category::new(1, 0, "Section"),
            Category::new(2, 1, "General").with_polls(true),
            Category::new(3, 1, "Archive").with_locked(true),
            Category::new(4, 1, "Alias").with_channels("2"),
        ])
        .unwrap();
        let access = MemoryAccess::new().with_public([1, 2, 3, 4]);
        ForumServices::new(config, Arc::new(categories), Arc::new(users), Arc::new(access))
    }

    fn eval(forum: &Forum, rule: RuleKind, category_id: i64, user: &User) -> AuthOutcome {
        let category = forum.category(category_id).unwrap();
        DefaultRuleEvaluator::new()
            .evaluate(rule, &RuleContext::new(forum, &category, user))
            .unwrap()
    }

    fn code(outcome: &AuthOutcome) -> Option<u16> {
        outcome.denial().map(|d| d.code.as_u16())
    }

    #[test]
    fn temporary_and_lifetime_bans() {
        let expiry = Utc::now() + Duration::days(3);
        let users = MemoryUserDirectory::new()
            .with_user(User::new(5, "temp"))
            .with_user(User::new(6, "forever"))
            .with_ban(BanRecord::until(5, expiry))
            .with_ban(BanRecord::lifetime(6));
        let forum = services(ForumConfig::default(), users).session(User::guest());

        let temp = eval(&forum, RuleKind::NotBanned, 2, &User::new(5, "temp"));
        assert_eq!(temp.denial().unwrap().reason, Reason::BannedUntil { expires_at: expiry });
        assert_eq!(code(&temp), Some(403));

        let forever = eval(&forum, RuleKind::NotBanned, 2, &User::new(6, "forever"));
        assert_eq!(forever.denial().unwrap().reason, Reason::Banned);

        assert!(eval(&forum, RuleKind::NotBanned, 2, &User::new(7, "clean")).is_allowed());
    }

    #[test]
    fn guest_write_follows_pubwrite() {
        let forum = services(ForumConfig::default(), MemoryUserDirectory::new()).session(User::guest());
        assert_eq!(code(&eval(&forum, RuleKind::GuestWrite, 2, &User::guest())), Some(401));
        assert!(eval(&forum, RuleKind::GuestWrite, 2, &User::new(5, "ann")).is_allowed());

        let open = ForumConfig {
            pubwrite: true,
            ..ForumConfig::default()
        };
        let forum = services(open, MemoryUserDirectory::new()).session(User::guest());
        assert!(eval(&forum, RuleKind::GuestWrite, 2, &User::guest()).is_allowed());
    }

    #[test]
    fn subscriptions_check_config_before_guest() {
        let disabled = ForumConfig {
            allowsubscriptions: false,
            ..ForumConfig::default()
        };
        let forum = services(disabled, MemoryUserDirectory::new()).session(User::guest());
        assert_eq!(code(&eval(&forum, RuleKind::Subscribe, 2, &User::guest())), Some(403));
        assert_eq!(code(&eval(&forum, RuleKind::CatSubscribe, 2, &User::guest())), Some(403));

        let forum = services(ForumConfig::default(), MemoryUserDirectory::new()).session(User::guest());
        assert_eq!(code(&eval(&forum, RuleKind::Subscribe, 2, &User::guest())), Some(401));
        assert!(eval(&forum, RuleKind::CatSubscribe, 2, &User::new(5, "ann")).is_allowed());
    }

    #[test]
    fn sections_and_aliases() {
        let forum = services(ForumConfig::default(), MemoryUserDirectory::new()).session(User::guest());
        let ann = User::new(5, "ann");
        assert_eq!(eval(&forum, RuleKind::NotSection, 1, &ann).denial().unwrap().reason, Reason::IsSection);
        assert!(eval(&forum, RuleKind::NotSection, 2, &ann).is_allowed());
        assert_eq!(eval(&forum, RuleKind::Channel, 4, &ann).denial().unwrap().reason, Reason::IsAlias);
        assert!(eval(&forum, RuleKind::Channel, 2, &ann).is_allowed());
    }

    #[test]
    fn locked_category_admits_moderators() {
        let users = MemoryUserDirectory::new()
            .with_user(User::new(5, "ann"))
            .with_moderator(8, Some(3));
        let forum = services(ForumConfig::default(), users).session(User::guest());

        assert_eq!(code(&eval(&forum, RuleKind::Unlocked, 3, &User::new(5, "ann"))), Some(403));
        assert_eq!(code(&eval(&forum, RuleKind::Unlocked, 3, &User::guest())), Some(403));
        assert!(eval(&forum, RuleKind::Unlocked, 3, &User::new(8, "mod")).is_allowed());
        assert!(eval(&forum, RuleKind::Unlocked, 2, &User::new(5, "ann")).is_allowed());
    }

    #[test]
    fn moderation_roles() {
        let users = MemoryUserDirectory::new()
            .with_moderator(8, Some(2))
            .with_moderator(9, None)
            .with_admin(10, Some(2));
        let forum = services(ForumConfig::default(), users).session(User::guest());

        assert_eq!(code(&eval(&forum, RuleKind::Moderate, 2, &User::guest())), Some(401));
        assert!(eval(&forum, RuleKind::Moderate, 2, &User::new(8, "mod")).is_allowed());
        assert_eq!(code(&eval(&forum, RuleKind::Moderate, 3, &User::new(8, "mod"))), Some(403));

        assert_eq!(code(&eval(&forum, RuleKind::GlobalModerate, 2, &User::new(8, "mod"))), Some(403));
        assert!(eval(&forum, RuleKind::GlobalModerate, 2, &User::new(9, "global")).is_allowed());

        assert!(eval(&forum, RuleKind::Admin, 2, &User::new(10, "admin")).is_allowed());
        assert_eq!(code(&eval(&forum, RuleKind::Admin, 2, &User::new(8, "mod"))), Some(403));
        assert_eq!(code(&eval(&forum, RuleKind::Admin, 2, &User::guest())), Some(401));
    }

    #[test]
    fn polls_and_votes() {
        let forum = services(ForumConfig::default(), MemoryUserDirectory::new()).session(User::guest());
        let ann = User::new(5, "ann");
        assert!(eval(&forum, RuleKind::Poll, 2, &ann).is_allowed());
        assert_eq!(eval(&forum, RuleKind::Poll, 3, &ann).denial().unwrap().reason, Reason::PollsNotAllowed);
        assert_eq!(code(&eval(&forum, RuleKind::Vote, 2, &User::guest())), Some(401));

        let off = ForumConfig {
            pollenabled: false,
            ..ForumConfig::default()
        };
        let forum = services(off, MemoryUserDirectory::new()).session(User::guest());
        assert_eq!(eval(&forum, RuleKind::Poll, 2, &ann).denial().unwrap().reason, Reason::PollsDisabled);
    }

    #[test]
    fn uploads_follow_attachment_policy() {
        let forum = services(ForumConfig::default(), MemoryUserDirectory::new()).session(User::guest());
        assert_eq!(code(&eval(&forum, RuleKind::Upload, 2, &User::guest())), Some(403));
        assert!(eval(&forum, RuleKind::Upload, 2, &User::new(5, "ann")).is_allowed());
    }
}
