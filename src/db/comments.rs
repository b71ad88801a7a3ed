use crate::db::{models::*, DbPool};
use crate::error::{Error, Result};
use chrono::Utc;

/// Create a comment or reply
pub async fn create_comment(
    pool: &DbPool,
    chapter_id: i64,
    user_id: i64,
    parent_id: Option<i64>,
    content: &str,
) -> Result<Comment> {
    let now = Utc::now();

    let comment = sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (chapter_id, user_id, parent_id, content, edited, created_at, updated_at)
        VALUES (?, ?, ?, ?, 0, ?, ?)
        RETURNING *
        "#,
    )
    .bind(chapter_id)
    .bind(user_id)
    .bind(parent_id)
    .bind(content)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(comment)
}

pub async fn get_comment(pool: &DbPool, comment_id: i64) -> Result<Comment> {
    sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ?")
        .bind(comment_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Comment {comment_id} not found")))
}

/// All comments of a chapter with their authors, oldest first
pub async fn list_comments(pool: &DbPool, chapter_id: i64) -> Result<Vec<CommentRow>> {
    let rows = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT c.id, c.chapter_id, c.user_id, u.username, u.display_name, c.parent_id,
               c.content, c.edited, c.created_at, c.updated_at
        FROM comments c
        JOIN users u ON u.id = c.user_id
        WHERE c.chapter_id = ?
        ORDER BY c.created_at, c.id
        "#,
    )
    .bind(chapter_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Replace comment content and flag it as edited
pub async fn update_comment(pool: &DbPool, comment_id: i64, content: &str) -> Result<Comment> {
    let comment = sqlx::query_as::<_, Comment>(
        r#"
        UPDATE comments SET content = ?, edited = 1, updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(content)
    .bind(Utc::now())
    .bind(comment_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Comment {comment_id} not found")))?;

    Ok(comment)
}

/// Delete a comment; replies cascade
pub async fn delete_comment(pool: &DbPool, comment_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(comment_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn count_chapter_comments(pool: &DbPool, chapter_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE chapter_id = ?")
        .bind(chapter_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_story_comments(pool: &DbPool, story_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM comments cm
        JOIN chapters c ON c.id = cm.chapter_id
        WHERE c.story_id = ?
        "#,
    )
    .bind(story_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
