use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::actions;

/// A single named check in an action's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    Read,
    NotBanned,
    GuestWrite,
    Subscribe,
    CatSubscribe,
    Favorite,
    NotSection,
    Channel,
    Unlocked,
    Moderate,
    GlobalModerate,
    Admin,
    Poll,
    Vote,
    Upload,
}

impl RuleKind {
    pub const ALL: [RuleKind; 15] = [
        RuleKind::Read,
        RuleKind::NotBanned,
        RuleKind::GuestWrite,
        RuleKind::Subscribe,
        RuleKind::CatSubscribe,
        RuleKind::Favorite,
        RuleKind::NotSection,
        RuleKind::Channel,
        RuleKind::Unlocked,
        RuleKind::Moderate,
        RuleKind::GlobalModerate,
        RuleKind::Admin,
        RuleKind::Poll,
        RuleKind::Vote,
        RuleKind::Upload,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::Read => "Read",
            RuleKind::NotBanned => "NotBanned",
            RuleKind::GuestWrite => "GuestWrite",
            RuleKind::Subscribe => "Subscribe",
            RuleKind::CatSubscribe => "CatSubscribe",
            RuleKind::Favorite => "Favorite",
            RuleKind::NotSection => "NotSection",
            RuleKind::Channel => "Channel",
            RuleKind::Unlocked => "Unlocked",
            RuleKind::Moderate => "Moderate",
            RuleKind::GlobalModerate => "GlobalModerate",
            RuleKind::Admin => "Admin",
            RuleKind::Poll => "Poll",
            RuleKind::Vote => "Vote",
            RuleKind::Upload => "Upload",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rule| rule.name() == name)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable mapping from action name to its ordered rule chain.
///
/// Chains short-circuit on the first denial, so cheap checks come first.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    chains: HashMap<String, Vec<RuleKind>>,
}

impl RuleTable {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<RuleKind>)>,
        S: Into<String>,
    {
        Self {
            chains: entries.into_iter().map(|(action, chain)| (action.into(), chain)).collect(),
        }
    }

    /// The forum's action table, built once per process.
    pub fn standard() -> Arc<RuleTable> {
        static TABLE: OnceLock<Arc<RuleTable>> = OnceLock::new();
        TABLE.get_or_init(|| Arc::new(Self::build_standard())).clone()
    }

    fn build_standard() -> Self {
        use RuleKind::*;

        Self::from_entries([
            (actions::NONE, vec![]),
            (actions::READ, vec![Read]),
            (actions::SUBSCRIBE, vec![Read, CatSubscribe, NotBanned, NotSection]),
            (actions::MODERATE, vec![Read, NotBanned, Moderate]),
            (actions::ADMIN, vec![NotBanned, Admin]),
            (actions::TOPIC_READ, vec![Read]),
            (actions::TOPIC_CREATE, vec![Read, GuestWrite, NotBanned, NotSection, Unlocked, Channel]),
            (actions::TOPIC_REPLY, vec![Read, GuestWrite, NotBanned, NotSection, Unlocked]),
            (actions::TOPIC_EDIT, vec![Read, NotBanned, Unlocked]),
            (actions::TOPIC_MOVE, vec![Read, NotBanned, Moderate, Channel]),
            (actions::TOPIC_APPROVE, vec![Read, NotBanned, Moderate]),
            (actions::TOPIC_DELETE, vec![Read, NotBanned, Moderate]),
            (actions::TOPIC_UNDELETE, vec![Read, NotBanned, Moderate]),
            (actions::TOPIC_PERMDELETE, vec![Read, NotBanned, Moderate]),
            (actions::TOPIC_FAVORITE, vec![Read, NotBanned, Favorite]),
            (actions::TOPIC_SUBSCRIBE, vec![Read, NotBanned, Subscribe]),
            (actions::TOPIC_STICKY, vec![Read, NotBanned, Moderate]),
            (actions::TOPIC_LOCK, vec![Read, NotBanned, Moderate]),
            (actions::TOPIC_POLL_READ, vec![Read, Poll]),
            (actions::TOPIC_POLL_CREATE, vec![Read, GuestWrite, NotBanned, Unlocked, Poll]),
            (actions::TOPIC_POLL_EDIT, vec![Read, NotBanned, Unlocked, Poll, Vote]),
            (actions::TOPIC_POLL_DELETE, vec![Read, NotBanned, Unlocked, Poll, Vote]),
            (actions::TOPIC_POLL_VOTE, vec![Read, NotBanned, Unlocked, Poll, Vote]),
            (actions::TOPIC_POST_READ, vec![Read]),
            (actions::TOPIC_POST_REPLY, vec![Read, GuestWrite, NotBanned, NotSection, Unlocked]),
            (actions::TOPIC_POST_THANKYOU, vec![Read, NotBanned]),
            (actions::TOPIC_POST_UNTHANKYOU, vec![Read, NotBanned]),
            (actions::TOPIC_POST_EDIT, vec![Read, NotBanned, Unlocked]),
            (actions::TOPIC_POST_MOVE, vec![Read, NotBanned, Moderate, Channel]),
            (actions::TOPIC_POST_APPROVE, vec![Read, NotBanned, Moderate]),
            (actions::TOPIC_POST_DELETE, vec![Read, NotBanned, Unlocked]),
            (actions::TOPIC_POST_UNDELETE, vec![Read, NotBanned, Moderate]),
            (actions::TOPIC_POST_PERMDELETE, vec![Read, NotBanned, Admin]),
            (actions::TOPIC_POST_ATTACHMENT_READ, vec![Read]),
            (
                actions::TOPIC_POST_ATTACHMENT_CREATEIMAGE,
                vec![Read, GuestWrite, NotBanned, Unlocked, Upload],
            ),
            (
                actions::TOPIC_POST_ATTACHMENT_CREATEFILE,
                vec![Read, GuestWrite, NotBanned, Unlocked, Upload],
            ),
            (actions::TOPIC_POST_ATTACHMENT_DELETE, vec![NotBanned]),
        ])
    }

    pub fn chain(&self, action: &str) -> Option<&[RuleKind]> {
        self.chains.get(action).map(Vec::as_slice)
    }

    pub fn contains(&self, action: &str) -> bool {
        self.chains.contains_key(action)
    }

    /// Action names in sorted order.
    pub fn actions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
