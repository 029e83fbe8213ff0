use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ForumConfig;
use crate::errors::{AppError, AppResult};
use crate::forum::ForumServices;
use crate::models::{BanRecord, Category, CategoryId, TopicSummary, User, UserId};

use super::{CategoryStore, MemoryAccess, MemoryCategoryStore, MemoryUserDirectory, StaticOverrides};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub userid: UserId,
    /// Missing means the role applies forum-wide.
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadGrant {
    pub userid: UserId,
    pub category_id: CategoryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub userid: UserId,
    pub category_id: CategoryId,
    pub action: String,
    pub allowed: bool,
}

/// An edit lock held when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLock {
    pub category_id: CategoryId,
    pub userid: UserId,
}

/// Everything a forum session needs, captured at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub config: ForumConfig,
    pub categories: Vec<Category>,
    pub topics: Vec<TopicSummary>,
    pub users: Vec<User>,
    pub bans: Vec<BanRecord>,
    pub moderators: Vec<RoleGrant>,
    pub admins: Vec<RoleGrant>,
    pub public_categories: Vec<CategoryId>,
    pub read_grants: Vec<ReadGrant>,
    pub overrides: Vec<OverrideEntry>,
    pub locks: Vec<EditLock>,
}

impl Snapshot {
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| AppError::configuration(format!("failed to read {}: {err}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|err| AppError::configuration(format!("invalid fixture {}: {err}", path.display())))
    }

    pub fn into_services(self) -> AppResult<ForumServices> {
        let categories = MemoryCategoryStore::with_categories(self.categories)?;
        for topic in self.topics {
            categories.add_topic(topic)?;
        }
        for lock in self.locks {
            categories.try_lock(lock.category_id, lock.userid).map_err(|err| {
                AppError::configuration(format!("edit lock on category {}: {err}", lock.category_id))
            })?;
        }

        let mut users = MemoryUserDirectory::new();
        for user in self.users {
            users = users.with_user(user);
        }
        for ban in self.bans {
            users = users.with_ban(ban);
        }
        for grant in self.moderators {
            users = users.with_moderator(grant.userid, grant.category_id);
        }
        for grant in self.admins {
            users = users.with_admin(grant.userid, grant.category_id);
        }

        let mut access = MemoryAccess::new().with_public(self.public_categories);
        for grant in self.read_grants {
            access = access.with_grant(grant.userid, grant.category_id);
        }

        let mut overrides = StaticOverrides::new();
        for entry in self.overrides {
            overrides = overrides.with_entry(entry.category_id, entry.userid, entry.action, entry.allowed);
        }

        Ok(ForumServices::new(
            self.config,
            Arc::new(categories),
            Arc::new(users),
            Arc::new(access),
        )
        .with_overrides(Arc::new(overrides)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::authz::actions;

    const FIXTURE: &str = r#"{
        "config": { "pubwrite": true },
        "categories": [
            { "id": 1, "parent_id": 0, "name": "Section" },
            { "id": 2, "parent_id": 1, "name": "General", "num_topics": 4 }
        ],
        "users": [ { "id": 5, "name": "ann" } ],
        "admins": [ { "userid": 5 } ],
        "public_categories": [1, 2],
        "overrides": [ { "userid": 9, "category_id": 2, "action": "topic.reply", "allowed": false } ],
        "locks": [ { "category_id": 2, "userid": 5 } ]
    }"#;

    #[test]
    fn loads_json_fixture() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();

        let snapshot = Snapshot::from_json_file(file.path()).unwrap();
        assert!(snapshot.config.pubwrite);
        assert_eq!(snapshot.categories.len(), 2);
        assert_eq!(snapshot.admins[0].category_id, None);
    }

    #[test]
    fn services_reflect_the_snapshot() {
        let snapshot: Snapshot = serde_json::from_str(FIXTURE).unwrap();
        let forum = snapshot.into_services().unwrap().session(User::guest());
        let general = forum.category(2).unwrap();

        assert!(forum.is_authorised(&general, actions::TOPIC_REPLY, &User::guest()).unwrap());
        assert!(!forum.is_authorised(&general, actions::TOPIC_REPLY, &User::new(9, "")).unwrap());
        assert!(forum.is_authorised(&general, actions::ADMIN, &User::new(5, "ann")).unwrap());

        assert!(forum.is_checked_out(&general, 9).unwrap());
        assert!(!forum.is_checked_out(&general, 5).unwrap());
        assert_eq!(forum.checkout(&general, 9).unwrap_err().kind(), "locked");
    }

    #[test]
    fn locks_on_unknown_categories_are_rejected() {
        let snapshot = Snapshot {
            locks: vec![EditLock { category_id: 42, userid: 5 }],
            ..Snapshot::default()
        };
        assert_eq!(snapshot.into_services().err().map(|err| err.kind()), Some("configuration"));
    }

    #[test]
    fn broken_fixture_is_a_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = Snapshot::from_json_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert_eq!(Snapshot::from_json_file("/nonexistent/forum.json").unwrap_err().kind(), "configuration");
    }
}
