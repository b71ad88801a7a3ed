use crate::db::{models::*, DbPool};
use crate::error::Result;

pub async fn get_progress(
    pool: &DbPool,
    user_id: i64,
    story_id: i64,
) -> Result<Option<ReadingProgress>> {
    let progress = sqlx::query_as::<_, ReadingProgress>(
        "SELECT * FROM reading_progress WHERE user_id = ? AND story_id = ?",
    )
    .bind(user_id)
    .bind(story_id)
    .fetch_optional(pool)
    .await?;

    Ok(progress)
}

/// Insert or replace the progress record for a (user, story) pair
pub async fn upsert_progress(pool: &DbPool, record: &ReadingProgress) -> Result<ReadingProgress> {
    let saved = sqlx::query_as::<_, ReadingProgress>(
        r#"
        INSERT INTO reading_progress
            (user_id, story_id, last_chapter_number, progress, scroll_position,
             time_spent_seconds, completed, last_read_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, story_id) DO UPDATE SET
            last_chapter_number = excluded.last_chapter_number,
            progress = excluded.progress,
            scroll_position = excluded.scroll_position,
            time_spent_seconds = excluded.time_spent_seconds,
            completed = excluded.completed,
            last_read_at = excluded.last_read_at
        RETURNING *
        "#,
    )
    .bind(record.user_id)
    .bind(record.story_id)
    .bind(record.last_chapter_number)
    .bind(record.progress)
    .bind(record.scroll_position)
    .bind(record.time_spent_seconds)
    .bind(record.completed)
    .bind(record.last_read_at)
    .fetch_one(pool)
    .await?;

    Ok(saved)
}

/// Reading history, most recently read first
pub async fn list_progress_for_user(
    pool: &DbPool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<ProgressWithStory>> {
    let rows = sqlx::query_as::<_, ProgressWithStory>(
        r#"
        SELECT p.story_id, s.slug AS story_slug, s.title AS story_title,
               p.last_chapter_number, p.progress, p.scroll_position,
               p.time_spent_seconds, p.completed, p.last_read_at
        FROM reading_progress p
        JOIN stories s ON s.id = p.story_id
        WHERE p.user_id = ?
        ORDER BY p.last_read_at DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Number of readers who finished the story
pub async fn count_completed_readers(pool: &DbPool, story_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reading_progress WHERE story_id = ? AND completed = 1",
    )
    .bind(story_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
