use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicSubscriptions {
    Disabled,
    First,
    Every,
}

impl FromStr for TopicSubscriptions {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "first" => Ok(Self::First),
            "every" => Ok(Self::Every),
            other => Err(AppError::configuration(format!(
                "topic subscriptions must be disabled, first or every (got {other:?})"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorySubscriptions {
    Disabled,
    Topic,
    Post,
}

impl FromStr for CategorySubscriptions {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "topic" => Ok(Self::Topic),
            "post" => Ok(Self::Post),
            other => Err(AppError::configuration(format!(
                "category subscriptions must be disabled, topic or post (got {other:?})"
            ))),
        }
    }
}

/// Forum-wide feature flags consulted by the rule evaluators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
    /// When set, every action other than `read` is refused.
    pub read_only: bool,
    /// Guests may create topics and replies.
    pub pubwrite: bool,
    pub allowsubscriptions: bool,
    pub topic_subscriptions: TopicSubscriptions,
    pub category_subscriptions: CategorySubscriptions,
    pub allowfavorites: bool,
    pub pollenabled: bool,
    pub enablerss: bool,
    pub image_extensions: Vec<String>,
    pub file_extensions: Vec<String>,
    pub guest_uploads: bool,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            pubwrite: false,
            allowsubscriptions: true,
            topic_subscriptions: TopicSubscriptions::Every,
            category_subscriptions: CategorySubscriptions::Post,
            allowfavorites: true,
            pollenabled: true,
            enablerss: true,
            image_extensions: ["jpg", "jpeg", "gif", "png", "webp"].map(String::from).to_vec(),
            file_extensions: ["zip", "txt", "pdf"].map(String::from).to_vec(),
            guest_uploads: false,
        }
    }
}

impl ForumConfig {
    /// Builds the configuration from `FORUM_*` environment variables, falling
    /// back to the defaults for anything unset.
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();

        Ok(Self {
            read_only: env_bool("FORUM_READ_ONLY", defaults.read_only)?,
            pubwrite: env_bool("FORUM_PUBWRITE", defaults.pubwrite)?,
            allowsubscriptions: env_bool("FORUM_ALLOW_SUBSCRIPTIONS", defaults.allowsubscriptions)?,
            topic_subscriptions: env_parsed("FORUM_TOPIC_SUBSCRIPTIONS", defaults.topic_subscriptions)?,
            category_subscriptions: env_parsed(
                "FORUM_CATEGORY_SUBSCRIPTIONS",
                defaults.category_subscriptions,
            )?,
            allowfavorites: env_bool("FORUM_ALLOW_FAVORITES", defaults.allowfavorites)?,
            pollenabled: env_bool("FORUM_POLLS_ENABLED", defaults.pollenabled)?,
            enablerss: env_bool("FORUM_ENABLE_RSS", defaults.enablerss)?,
            image_extensions: env_list("FORUM_IMAGE_EXTENSIONS").unwrap_or(defaults.image_extensions),
            file_extensions: env_list("FORUM_FILE_EXTENSIONS").unwrap_or(defaults.file_extensions),
            guest_uploads: env_bool("FORUM_GUEST_UPLOADS", defaults.guest_uploads)?,
        })
    }

    pub fn topic_subscriptions_enabled(&self) -> bool {
        self.allowsubscriptions && self.topic_subscriptions != TopicSubscriptions::Disabled
    }

    pub fn category_subscriptions_enabled(&self) -> bool {
        self.allowsubscriptions && self.category_subscriptions != CategorySubscriptions::Disabled
    }
}

fn env_bool(name: &str, default: bool) -> AppResult<bool> {
    match std::env::var(name) {
        Ok(value) => parse_bool(&value)
            .ok_or_else(|| AppError::configuration(format!("{name} must be a boolean (got {value:?})"))),
        Err(_) => Ok(default),
    }
}

fn env_parsed<T: FromStr<Err = AppError>>(name: &str, default: T) -> AppResult<T> {
    match std::env::var(name) {
        Ok(value) => value.parse(),
        Err(_) => Ok(default),
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|value| {
        value
            .split(',')
            .map(|item| item.trim().trim_start_matches('.').to_lowercase())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
