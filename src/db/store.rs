use sqlx::{Row, SqlitePool};

use crate::config::ForumConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{Category, CategoryId, UserId};
use crate::store::{EditLock, OverrideEntry, ReadGrant, RoleGrant, Snapshot};
use crate::utils::utc_now;

use super::row_parsers::{ban_from_row, category_from_row, topic_from_row, user_from_row};

const CATEGORY_COLUMNS: &str = "id, parent_id, name, channels, locked, review, allow_polls, allow_anonymous, hold, \
     num_topics, num_posts, last_topic_id, last_post_id, last_post_time";

/// Persistence for the forum tables. Sessions never query it directly: a
/// [`Snapshot`] is loaded per unit of work, carrying the edit locks held at
/// that point, and writes go through here.
#[derive(Debug, Clone)]
pub struct SqliteForumStore {
    pool: SqlitePool,
}

impl SqliteForumStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn load_snapshot(&self, config: ForumConfig) -> AppResult<Snapshot> {
        let categories = sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY id"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(category_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        let topics = sqlx::query(
            "SELECT id, category_id, hold, moved_id, last_post_id, last_post_time FROM topics ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(topic_from_row)
        .collect::<AppResult<Vec<_>>>()?;

        let users = sqlx::query("SELECT id, name FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(user_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        let bans = sqlx::query("SELECT userid, expires_at, reason FROM bans")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(ban_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        let moderators = self.role_grants("moderators").await?;
        let admins = self.role_grants("admins").await?;

        let public_categories = sqlx::query_scalar::<_, i64>("SELECT category_id FROM public_categories")
            .fetch_all(&self.pool)
            .await?;

        let read_grants = sqlx::query("SELECT userid, category_id FROM read_grants")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> AppResult<ReadGrant> {
                Ok(ReadGrant {
                    userid: row.try_get("userid")?,
                    category_id: row.try_get("category_id")?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let overrides = sqlx::query("SELECT userid, category_id, action, allowed FROM overrides")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> AppResult<OverrideEntry> {
                Ok(OverrideEntry {
                    userid: row.try_get("userid")?,
                    category_id: row.try_get("category_id")?,
                    action: row.try_get("action")?,
                    allowed: row.try_get("allowed")?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let locks = sqlx::query("SELECT id, checked_out FROM categories WHERE checked_out != 0")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> AppResult<EditLock> {
                Ok(EditLock {
                    category_id: row.try_get("id")?,
                    userid: row.try_get("checked_out")?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        tracing::debug!(
            categories = categories.len(),
            topics = topics.len(),
            users = users.len(),
            "snapshot loaded"
        );

        Ok(Snapshot {
            config,
            categories,
            topics,
            users,
            bans,
            moderators,
            admins,
            public_categories,
            read_grants,
            overrides,
            locks,
        })
    }

    async fn role_grants(&self, table: &str) -> AppResult<Vec<RoleGrant>> {
        sqlx::query(&format!("SELECT userid, category_id FROM {table}"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> AppResult<RoleGrant> {
                Ok(RoleGrant {
                    userid: row.try_get("userid")?,
                    category_id: row.try_get("category_id")?,
                })
            })
            .collect()
    }

    pub async fn get_category(&self, id: CategoryId) -> AppResult<Category> {
        let row = sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(format!("category {id}")))?;
        category_from_row(&row)
    }

    /// Inserts new categories and updates existing ones. Returns the stored
    /// record with its id.
    pub async fn save_category(&self, category: &Category) -> AppResult<Category> {
        let id = match category.id {
            Some(id) => {
                let result = sqlx::query(
                    "UPDATE categories SET parent_id = ?, name = ?, channels = ?, locked = ?, review = ?, \
                     allow_polls = ?, allow_anonymous = ?, hold = ?, num_topics = ?, num_posts = ?, \
                     last_topic_id = ?, last_post_id = ?, last_post_time = ? WHERE id = ?",
                )
                .bind(category.parent_id)
                .bind(&category.name)
                .bind(&category.channels)
                .bind(category.locked)
                .bind(category.review)
                .bind(category.allow_polls)
                .bind(category.allow_anonymous)
                .bind(category.hold)
                .bind(category.num_topics)
                .bind(category.num_posts)
                .bind(category.last_topic_id)
                .bind(category.last_post_id)
                .bind(category.last_post_time)
                .bind(id)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(AppError::not_found(format!("category {id}")));
                }
                id
            }
            None => sqlx::query(
                "INSERT INTO categories (parent_id, name, channels, locked, review, allow_polls, allow_anonymous, \
                 hold, num_topics, num_posts, last_topic_id, last_post_id, last_post_time) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(category.parent_id)
            .bind(&category.name)
            .bind(&category.channels)
            .bind(category.locked)
            .bind(category.review)
            .bind(category.allow_polls)
            .bind(category.allow_anonymous)
            .bind(category.hold)
            .bind(category.num_topics)
            .bind(category.num_posts)
            .bind(category.last_topic_id)
            .bind(category.last_post_id)
            .bind(category.last_post_time)
            .execute(&self.pool)
            .await?
            .last_insert_rowid(),
        };

        tracing::info!(category_id = id, "category stored");
        self.get_category(id).await
    }

    /// Removes the category together with its topics and access rows.
    pub async fn delete_category(&self, id: CategoryId) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("category {id}")));
        }

        for table in ["topics", "public_categories", "read_grants", "overrides", "moderators", "admins"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE category_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(category_id = id, "category deleted");
        Ok(())
    }

    /// Marks the category as edited by `actor`. Re-entrant for the holder.
    pub async fn checkout(&self, id: CategoryId, actor: UserId) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE categories SET checked_out = ?, checked_out_time = ? \
             WHERE id = ? AND (checked_out = 0 OR checked_out = ?)",
        )
        .bind(actor)
        .bind(utc_now().to_rfc3339())
        .bind(id)
        .bind(actor)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.locked_by(id).await? {
            Some(by) => Err(AppError::Locked { id, by }),
            None => Err(AppError::execution(format!("could not check out category {id}"))),
        }
    }

    pub async fn checkin(&self, id: CategoryId) -> AppResult<()> {
        let result = sqlx::query("UPDATE categories SET checked_out = 0, checked_out_time = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("category {id}")));
        }
        Ok(())
    }

    pub async fn locked_by(&self, id: CategoryId) -> AppResult<Option<UserId>> {
        let checked_out = sqlx::query_scalar::<_, i64>("SELECT checked_out FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(format!("category {id}")))?;

        Ok((checked_out != 0).then_some(checked_out))
    }
}
