use crate::db::{models::StorySummary, stories::SUMMARY_SELECT, DbPool};
use crate::error::Result;
use chrono::Utc;

/// Save a story to the reading list; returns `true` if newly added
pub async fn add_to_reading_list(pool: &DbPool, user_id: i64, story_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO reading_list (user_id, story_id, added_at) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(story_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn remove_from_reading_list(pool: &DbPool, user_id: i64, story_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM reading_list WHERE user_id = ? AND story_id = ?")
        .bind(user_id)
        .bind(story_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn in_reading_list(pool: &DbPool, user_id: i64, story_id: i64) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM reading_list WHERE user_id = ? AND story_id = ?")
            .bind(user_id)
            .bind(story_id)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Saved stories, most recently added first
pub async fn list_reading_list(pool: &DbPool, user_id: i64) -> Result<Vec<StorySummary>> {
    let sql = format!(
        "{SUMMARY_SELECT} JOIN reading_list rl ON rl.story_id = s.id \
         WHERE rl.user_id = ? ORDER BY rl.added_at DESC"
    );

    let stories = sqlx::query_as::<_, StorySummary>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(stories)
}
