use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// Sentinel id of the anonymous visitor.
pub const GUEST_ID: UserId = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn guest() -> Self {
        Self::new(GUEST_ID, "")
    }

    pub fn is_guest(&self) -> bool {
        self.id == GUEST_ID
    }
}

/// A ban placed on a user. No expiry means the ban is for life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub userid: UserId,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BanRecord {
    pub fn lifetime(userid: UserId) -> Self {
        Self {
            userid,
            expires_at: None,
            reason: None,
        }
    }

    pub fn until(userid: UserId, expires_at: DateTime<Utc>) -> Self {
        Self {
            userid,
            expires_at: Some(expires_at),
            reason: None,
        }
    }

    pub fn is_lifetime(&self) -> bool {
        self.expires_at.is_none()
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry > now,
            None => true,
        }
    }
}
