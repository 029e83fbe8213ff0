use std::rc::Rc;

use indexmap::IndexMap;

use crate::authz::actions;
use crate::errors::AppResult;
use crate::models::{Category, CategoryKey};
use crate::store::Depth;

use super::{AggregateState, Forum};

/// Totals of a category across itself, its channels and its subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub topics: i64,
    pub posts: i64,
    /// Member with the most recent post; the category itself when nothing
    /// below it is newer.
    pub last_category: Rc<Category>,
}

impl Aggregate {
    fn raw(category: Rc<Category>) -> Self {
        Self {
            topics: category.num_topics.max(0),
            posts: category.num_posts.max(0),
            last_category: category,
        }
    }

    pub fn replies(&self) -> i64 {
        (self.posts - self.topics).max(0)
    }
}

impl Forum {
    /// Computes the category's aggregate once per session.
    ///
    /// A category whose aggregate is still being built (a channel cycle led
    /// back to it) is answered with its own stored counters.
    pub fn build_info(&self, category: &Category) -> AppResult<Rc<Aggregate>> {
        let Some(id) = category.id else {
            return self.compute_aggregate(category).map(Rc::new);
        };

        match self.caches.borrow().aggregates.get(&id) {
            Some(AggregateState::Built(done)) => return Ok(done.clone()),
            Some(AggregateState::Building) => {
                tracing::trace!(category_id = id, "aggregate re-entered");
                return Ok(Rc::new(Aggregate::raw(self.shared(category))));
            }
            None => {}
        }

        self.caches
            .borrow_mut()
            .aggregates
            .insert(id, AggregateState::Building);

        match self.compute_aggregate(category) {
            Ok(aggregate) => {
                let aggregate = Rc::new(aggregate);
                tracing::debug!(
                    category_id = id,
                    topics = aggregate.topics,
                    posts = aggregate.posts,
                    "aggregate built"
                );
                self.caches
                    .borrow_mut()
                    .aggregates
                    .insert(id, AggregateState::Built(aggregate.clone()));
                Ok(aggregate)
            }
            Err(err) => {
                self.caches.borrow_mut().aggregates.remove(&id);
                Err(err)
            }
        }
    }

    fn compute_aggregate(&self, category: &Category) -> AppResult<Aggregate> {
        let me = self.shared(category);

        let mut members: IndexMap<CategoryKey, Rc<Category>> = IndexMap::new();
        members.insert(category.key(), me.clone());
        for channel in self.channels(category, actions::NONE)? {
            members.entry(channel.key()).or_insert(channel);
        }
        if let Some(id) = category.id {
            // Each child folds in its own subtree.
            for child in self.children(id, Depth::Immediate)? {
                members.entry(child.key()).or_insert(child);
            }
        }

        let mut total = Aggregate {
            topics: 0,
            posts: 0,
            last_category: me,
        };

        for (key, member) in members {
            let share = if key == category.key() {
                Aggregate::raw(member)
            } else {
                (*self.build_info(&member)?).clone()
            };

            total.topics = total.topics.saturating_add(share.topics);
            total.posts = total.posts.saturating_add(share.posts);
            if share.last_category.last_post_time > total.last_category.last_post_time {
                total.last_category = share.last_category;
            }
        }

        Ok(total)
    }

    pub fn topics(&self, category: &Category) -> AppResult<i64> {
        Ok(self.build_info(category)?.topics)
    }

    pub fn posts(&self, category: &Category) -> AppResult<i64> {
        Ok(self.build_info(category)?.posts)
    }

    /// Posts minus topics, never negative.
    pub fn replies(&self, category: &Category) -> AppResult<i64> {
        Ok(self.build_info(category)?.replies())
    }

    pub fn last_category(&self, category: &Category) -> AppResult<Rc<Category>> {
        Ok(self.build_info(category)?.last_category.clone())
    }

    pub fn is_section(&self, category: &Category) -> AppResult<bool> {
        self.build_info(category)?;
        Ok(category.is_top_level())
    }
}
