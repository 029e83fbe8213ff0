use serde::{Deserialize, Serialize};

use super::category::CategoryId;

/// The slice of a topic that category counter maintenance looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicSummary {
    pub id: i64,
    pub category_id: CategoryId,
    pub hold: i32,
    /// Non-zero when the topic was moved and only a shadow remains here.
    pub moved_id: i64,
    pub last_post_id: i64,
    pub last_post_time: i64,
}

impl TopicSummary {
    pub fn exists(&self) -> bool {
        self.id != 0
    }

    /// Published and not a moved shadow.
    pub fn is_visible(&self) -> bool {
        self.exists() && self.hold == 0 && self.moved_id == 0
    }
}
