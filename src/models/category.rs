use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

pub type CategoryId = i64;

/// Cache key for a category. `None` identifies a category that has not been
/// persisted yet.
pub type CategoryKey = Option<CategoryId>;

/// A node of the forum hierarchy together with its stored counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub id: Option<CategoryId>,
    /// 0 marks a top-level section.
    pub parent_id: CategoryId,
    pub name: String,
    /// Raw channel specification, e.g. `"THIS,CHILDREN,12"`.
    pub channels: String,
    pub locked: bool,
    pub review: bool,
    pub allow_polls: bool,
    pub allow_anonymous: bool,
    pub hold: i32,
    pub num_topics: i64,
    pub num_posts: i64,
    pub last_topic_id: i64,
    pub last_post_id: i64,
    pub last_post_time: i64,
}

impl Category {
    pub fn new(id: CategoryId, parent_id: CategoryId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            parent_id,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_channels(mut self, channels: impl Into<String>) -> Self {
        self.channels = channels.into();
        self
    }

    pub fn with_counts(mut self, topics: i64, posts: i64) -> Self {
        self.num_topics = topics;
        self.num_posts = posts;
        self
    }

    pub fn with_last_post(mut self, topic_id: i64, post_id: i64, time: i64) -> Self {
        self.last_topic_id = topic_id;
        self.last_post_id = post_id;
        self.last_post_time = time;
        self
    }

    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn with_polls(mut self, allow_polls: bool) -> Self {
        self.allow_polls = allow_polls;
        self
    }

    pub fn key(&self) -> CategoryKey {
        self.id
    }

    /// A category exists once it has been persisted and carries an id.
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id == 0
    }

    pub fn state(&self) -> HoldState {
        HoldState::from_hold(self.hold)
    }

    pub fn channel_spec(&self) -> ChannelSpec {
        ChannelSpec::parse(&self.channels, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldState {
    Published,
    Unapproved,
    Deleted,
    Unknown,
}

impl HoldState {
    pub fn from_hold(hold: i32) -> Self {
        match hold {
            0 => HoldState::Published,
            1 => HoldState::Unapproved,
            2 | 3 => HoldState::Deleted,
            _ => HoldState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HoldState::Published => "published",
            HoldState::Unapproved => "unapproved",
            HoldState::Deleted => "deleted",
            HoldState::Unknown => "unknown",
        }
    }
}

const TOKEN_THIS: &str = "THIS";
const TOKEN_CHILDREN: &str = "CHILDREN";

/// Parsed form of [`Category::channels`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSpec {
    pub include_self: bool,
    /// Literal category ids in first-seen order, without duplicates and
    /// without the owning category.
    pub ids: IndexSet<CategoryId>,
    pub children: bool,
    /// Tokens that are neither ids nor keywords.
    pub unknown: Vec<String>,
}

impl ChannelSpec {
    pub fn parse(raw: &str, own_id: Option<CategoryId>) -> Self {
        let raw = raw.trim();
        let is_own = |value: &str| own_id.map(|id| value == id.to_string()).unwrap_or(false);

        if raw.is_empty() || is_own(raw) {
            return Self::self_only();
        }

        let mut spec = Self::default();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if token == TOKEN_THIS || token == "0" || is_own(token) {
                spec.include_self = true;
            } else if token == TOKEN_CHILDREN {
                spec.children = true;
            } else {
                match token.parse::<CategoryId>() {
                    Ok(id) if id > 0 => {
                        spec.ids.insert(id);
                    }
                    _ => spec.unknown.push(token.to_string()),
                }
            }
        }
        spec
    }

    pub fn self_only() -> Self {
        Self {
            include_self: true,
            ..Self::default()
        }
    }

    pub fn is_self_only(&self) -> bool {
        self.include_self && self.ids.is_empty() && !self.children
    }
}
