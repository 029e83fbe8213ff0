use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// HTTP-style status carried by a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyCode {
    /// 401: logging in may help.
    Unauthorized,
    /// 403: the user is known and still not allowed.
    Forbidden,
    /// 404: the category does not exist.
    NotFound,
    /// 500: the category or forum is misconfigured.
    InvalidConfiguration,
}

impl DenyCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            DenyCode::Unauthorized => 401,
            DenyCode::Forbidden => 403,
            DenyCode::NotFound => 404,
            DenyCode::InvalidConfiguration => 500,
        }
    }
}

impl fmt::Display for DenyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Why an action was refused. Callers translate [`Reason::key`] into a
/// localized message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Reason {
    NoAccess,
    BannedUntil { expires_at: DateTime<Utc> },
    Banned,
    AnonymousForbidden,
    SubscriptionsDisabled,
    FavoritesDisabled,
    IsSection,
    IsAlias,
    CategoryLocked,
    NotModerator,
    NotGlobalModerator,
    NotAdmin,
    PollsDisabled,
    PollsNotAllowed,
    PollLoginRequired,
    UploadNotAllowed,
}

impl Reason {
    pub fn key(&self) -> &'static str {
        match self {
            Reason::NoAccess => "access.no_access",
            Reason::BannedUntil { .. } => "user.banned_until",
            Reason::Banned => "user.banned",
            Reason::AnonymousForbidden => "post.anonymous_forbidden",
            Reason::SubscriptionsDisabled => "category.subscriptions_disabled",
            Reason::FavoritesDisabled => "category.favorites_disabled",
            Reason::IsSection => "category.is_section",
            Reason::IsAlias => "category.is_alias",
            Reason::CategoryLocked => "category.locked",
            Reason::NotModerator => "moderation.not_moderator",
            Reason::NotGlobalModerator => "moderation.not_global_moderator",
            Reason::NotAdmin => "moderation.not_admin",
            Reason::PollsDisabled => "poll.disabled",
            Reason::PollsNotAllowed => "poll.not_allowed",
            Reason::PollLoginRequired => "poll.login_required",
            Reason::UploadNotAllowed => "attachment.upload_not_allowed",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::NoAccess => write!(f, "you do not have access to this category"),
            Reason::BannedUntil { expires_at } => {
                write!(f, "you are banned until {}", expires_at.format("%Y-%m-%d %H:%M UTC"))
            }
            Reason::Banned => write!(f, "you are banned"),
            Reason::AnonymousForbidden => write!(f, "guests are not allowed to post"),
            Reason::SubscriptionsDisabled => write!(f, "subscriptions are not available"),
            Reason::FavoritesDisabled => write!(f, "favorites are not available"),
            Reason::IsSection => write!(f, "sections cannot hold topics"),
            Reason::IsAlias => write!(f, "this category only aliases other categories"),
            Reason::CategoryLocked => write!(f, "the category is locked"),
            Reason::NotModerator => write!(f, "you are not a moderator of this category"),
            Reason::NotGlobalModerator => write!(f, "you are not a global moderator"),
            Reason::NotAdmin => write!(f, "you are not an administrator of this category"),
            Reason::PollsDisabled => write!(f, "polls are disabled"),
            Reason::PollsNotAllowed => write!(f, "polls are not allowed in this category"),
            Reason::PollLoginRequired => write!(f, "log in to vote"),
            Reason::UploadNotAllowed => write!(f, "uploads are not allowed here"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub code: DenyCode,
    #[serde(flatten)]
    pub reason: Reason,
}

impl Denial {
    pub fn new(code: DenyCode, reason: Reason) -> Self {
        Self { code, reason }
    }

    pub fn unauthorized(reason: Reason) -> Self {
        Self::new(DenyCode::Unauthorized, reason)
    }

    pub fn forbidden(reason: Reason) -> Self {
        Self::new(DenyCode::Forbidden, reason)
    }

    pub fn not_found(reason: Reason) -> Self {
        Self::new(DenyCode::NotFound, reason)
    }

    /// 401 for guests, 403 for everybody else.
    pub fn for_visitor(is_guest: bool, reason: Reason) -> Self {
        if is_guest {
            Self::unauthorized(reason)
        } else {
            Self::forbidden(reason)
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthOutcome {
    Allowed,
    Denied(Denial),
}

impl AuthOutcome {
    pub fn deny(code: DenyCode, reason: Reason) -> Self {
        AuthOutcome::Denied(Denial::new(code, reason))
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthOutcome::Allowed)
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            AuthOutcome::Allowed => None,
            AuthOutcome::Denied(denial) => Some(denial),
        }
    }

    /// Turns a denial into [`AppError::Denied`].
    pub fn into_result(self) -> AppResult<()> {
        match self {
            AuthOutcome::Allowed => Ok(()),
            AuthOutcome::Denied(denial) => Err(AppError::Denied(denial)),
        }
    }
}

impl From<Denial> for AuthOutcome {
    fn from(value: Denial) -> Self {
        AuthOutcome::Denied(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visitor_denials_pick_code() {
        assert_eq!(Denial::for_visitor(true, Reason::NoAccess).code.as_u16(), 401);
        assert_eq!(Denial::for_visitor(false, Reason::NoAccess).code.as_u16(), 403);
    }

    #[test]
    fn denied_outcome_becomes_error() {
        let err = AuthOutcome::deny(DenyCode::Forbidden, Reason::CategoryLocked)
            .into_result()
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.kind(), "denied");
        assert!(AuthOutcome::Allowed.into_result().is_ok());
    }

    #[test]
    fn serializes_with_code_and_reason() {
        let value = serde_json::to_value(AuthOutcome::deny(DenyCode::Unauthorized, Reason::PollLoginRequired)).unwrap();
        assert_eq!(value["outcome"], "denied");
        assert_eq!(value["code"], "unauthorized");
        assert_eq!(value["reason"], "poll_login_required");
    }
}
