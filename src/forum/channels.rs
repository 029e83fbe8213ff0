use std::rc::Rc;

use crate::authz::actions;
use crate::errors::{AppError, AppResult};
use crate::models::Category;
use crate::store::Depth;

use super::{ChannelSet, Forum};

impl Forum {
    /// Categories whose content `category` presents, as seen for `action`.
    ///
    /// The membership is resolved once under `none`; every other action is
    /// a filtered view of that set. The category itself always passes the
    /// `read` view.
    pub fn channels(&self, category: &Category, action: &str) -> AppResult<Vec<Rc<Category>>> {
        Ok(self.channel_set(category, action)?.values().cloned().collect())
    }

    /// Whether `category` shows up in its own unfiltered channel set.
    pub fn is_own_channel(&self, category: &Category) -> AppResult<bool> {
        Ok(self.channel_set(category, actions::NONE)?.contains_key(&category.key()))
    }

    pub(crate) fn channel_set(&self, category: &Category, action: &str) -> AppResult<Rc<ChannelSet>> {
        if let Some(id) = category.id {
            let caches = self.caches.borrow();
            if let Some(found) = caches.channels.get(&id).and_then(|views| views.get(action)) {
                tracing::trace!(category_id = id, action, "channel cache hit");
                return Ok(found.clone());
            }
        }

        let resolved = if action == actions::NONE {
            Rc::new(self.resolve_channels(category)?)
        } else {
            let members = self.channel_set(category, actions::NONE)?;
            Rc::new(self.filter_channels(category, &members, action)?)
        };

        if let Some(id) = category.id {
            self.caches
                .borrow_mut()
                .channels
                .entry(id)
                .or_default()
                .insert(action.to_string(), resolved.clone());
        }

        Ok(resolved)
    }

    fn resolve_channels(&self, category: &Category) -> AppResult<ChannelSet> {
        let spec = category.channel_spec();
        let mut set = ChannelSet::new();

        if spec.include_self {
            set.insert(category.key(), self.shared(category));
        }

        for &id in &spec.ids {
            if set.contains_key(&Some(id)) {
                continue;
            }
            match self.category(id) {
                Ok(channel) => {
                    set.insert(Some(id), channel);
                }
                Err(AppError::NotFound(_)) => {
                    tracing::debug!(category_id = ?category.id, channel_id = id, "skipping missing channel");
                }
                Err(err) => return Err(err),
            }
        }

        if spec.children {
            if let Some(id) = category.id {
                for child in self.children(id, Depth::Immediate)? {
                    set.entry(child.key()).or_insert(child);
                }
            }
        }

        for token in &spec.unknown {
            tracing::warn!(category_id = ?category.id, token = %token, "ignoring unknown channel token");
        }

        Ok(set)
    }

    fn filter_channels(&self, category: &Category, members: &ChannelSet, action: &str) -> AppResult<ChannelSet> {
        let myself = self.myself().clone();
        let mut view = ChannelSet::new();

        for (key, channel) in members {
            let is_self = *key == category.key();
            if (is_self && action == actions::READ) || self.is_authorised(channel, action, &myself)? {
                view.insert(*key, channel.clone());
            }
        }

        Ok(view)
    }

    /// The registered instance of `category` when the session has one.
    pub(crate) fn shared(&self, category: &Category) -> Rc<Category> {
        if let Some(id) = category.id {
            if let Some(found) = self.caches.borrow().registry.get(&id) {
                return found.clone();
            }
        }
        Rc::new(category.clone())
    }
}
