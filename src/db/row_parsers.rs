use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::errors::AppError;
use crate::models::{BanRecord, Category, TopicSummary, User};

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite CURRENT_TIMESTAMP, optionally with fractional seconds
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn parse_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_datetime(&s)?)),
        _ => Ok(None),
    }
}

pub fn category_from_row(row: &SqliteRow) -> Result<Category, AppError> {
    let id: i64 = row.try_get("id").map_err(|e| AppError::internal(format!("missing id: {}", e)))?;
    let parent_id: i64 = row.try_get("parent_id").map_err(|e| AppError::internal(format!("missing parent_id: {}", e)))?;
    let name: String = row.try_get("name").map_err(|e| AppError::internal(format!("missing name: {}", e)))?;
    let channels: Option<String> = row.try_get("channels").map_err(|e| AppError::internal(format!("missing channels: {}", e)))?;
    let locked: bool = row.try_get("locked").map_err(|e| AppError::internal(format!("missing locked: {}", e)))?;
    let review: bool = row.try_get("review").map_err(|e| AppError::internal(format!("missing review: {}", e)))?;
    let allow_polls: bool = row.try_get("allow_polls").map_err(|e| AppError::internal(format!("missing allow_polls: {}", e)))?;
    let allow_anonymous: bool = row.try_get("allow_anonymous").map_err(|e| AppError::internal(format!("missing allow_anonymous: {}", e)))?;
    let hold: i32 = row.try_get("hold").map_err(|e| AppError::internal(format!("missing hold: {}", e)))?;
    let num_topics: i64 = row.try_get("num_topics").map_err(|e| AppError::internal(format!("missing num_topics: {}", e)))?;
    let num_posts: i64 = row.try_get("num_posts").map_err(|e| AppError::internal(format!("missing num_posts: {}", e)))?;
    let last_topic_id: i64 = row.try_get("last_topic_id").map_err(|e| AppError::internal(format!("missing last_topic_id: {}", e)))?;
    let last_post_id: i64 = row.try_get("last_post_id").map_err(|e| AppError::internal(format!("missing last_post_id: {}", e)))?;
    let last_post_time: i64 = row.try_get("last_post_time").map_err(|e| AppError::internal(format!("missing last_post_time: {}", e)))?;

    Ok(Category {
        id: Some(id),
        parent_id,
        name,
        channels: channels.unwrap_or_default(),
        locked,
        review,
        allow_polls,
        allow_anonymous,
        hold,
        num_topics,
        num_posts,
        last_topic_id,
        last_post_id,
        last_post_time,
    })
}

pub fn topic_from_row(row: &SqliteRow) -> Result<TopicSummary, AppError> {
    let id: i64 = row.try_get("id").map_err(|e| AppError::internal(format!("missing id: {}", e)))?;
    let category_id: i64 = row.try_get("category_id").map_err(|e| AppError::internal(format!("missing category_id: {}", e)))?;
    let hold: i32 = row.try_get("hold").map_err(|e| AppError::internal(format!("missing hold: {}", e)))?;
    let moved_id: i64 = row.try_get("moved_id").map_err(|e| AppError::internal(format!("missing moved_id: {}", e)))?;
    let last_post_id: i64 = row.try_get("last_post_id").map_err(|e| AppError::internal(format!("missing last_post_id: {}", e)))?;
    let last_post_time: i64 = row.try_get("last_post_time").map_err(|e| AppError::internal(format!("missing last_post_time: {}", e)))?;

    Ok(TopicSummary { id, category_id, hold, moved_id, last_post_id, last_post_time })
}

pub fn user_from_row(row: &SqliteRow) -> Result<User, AppError> {
    let id: i64 = row.try_get("id").map_err(|e| AppError::internal(format!("missing id: {}", e)))?;
    let name: String = row.try_get("name").map_err(|e| AppError::internal(format!("missing name: {}", e)))?;

    Ok(User { id, name })
}

pub fn ban_from_row(row: &SqliteRow) -> Result<BanRecord, AppError> {
    let userid: i64 = row.try_get("userid").map_err(|e| AppError::internal(format!("missing userid: {}", e)))?;
    let expires_at_s: Option<String> = row.try_get("expires_at").map_err(|e| AppError::internal(format!("missing expires_at: {}", e)))?;
    let reason: Option<String> = row.try_get("reason").map_err(|e| AppError::internal(format!("missing reason: {}", e)))?;

    Ok(BanRecord { userid, expires_at: parse_opt_datetime(expires_at_s)?, reason })
}
