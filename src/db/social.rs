use crate::db::DbPool;
use crate::error::Result;
use chrono::Utc;

/// Follow an author; returns `true` if a new follow was recorded
pub async fn follow(pool: &DbPool, follower_id: i64, author_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO follows (follower_id, author_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(follower_id)
    .bind(author_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Unfollow an author; returns `true` if a follow was removed
pub async fn unfollow(pool: &DbPool, follower_id: i64, author_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND author_id = ?")
        .bind(follower_id)
        .bind(author_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn is_following(pool: &DbPool, follower_id: i64, author_id: i64) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = ? AND author_id = ?")
            .bind(follower_id)
            .bind(author_id)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

pub async fn count_followers(pool: &DbPool, author_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE author_id = ?")
        .bind(author_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_following(pool: &DbPool, follower_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = ?")
        .bind(follower_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// IDs of users who follow the author or saved the story
pub async fn list_chapter_audience(
    pool: &DbPool,
    author_id: i64,
    story_id: i64,
) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT follower_id FROM follows WHERE author_id = ?
        UNION
        SELECT user_id FROM reading_list WHERE story_id = ?
        "#,
    )
    .bind(author_id)
    .bind(story_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Like a chapter; idempotent
pub async fn like_chapter(pool: &DbPool, user_id: i64, chapter_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO chapter_likes (user_id, chapter_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(chapter_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn unlike_chapter(pool: &DbPool, user_id: i64, chapter_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM chapter_likes WHERE user_id = ? AND chapter_id = ?")
        .bind(user_id)
        .bind(chapter_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn count_chapter_likes(pool: &DbPool, chapter_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM chapter_likes WHERE chapter_id = ?")
        .bind(chapter_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn has_liked(pool: &DbPool, user_id: i64, chapter_id: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM chapter_likes WHERE user_id = ? AND chapter_id = ?",
    )
    .bind(user_id)
    .bind(chapter_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Total likes across all chapters of a story
pub async fn count_story_likes(pool: &DbPool, story_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM chapter_likes l
        JOIN chapters c ON c.id = l.chapter_id
        WHERE c.story_id = ?
        "#,
    )
    .bind(story_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewUser;
    use crate::db::{init_memory_db, users};

    #[tokio::test]
    async fn test_follow_is_idempotent() {
        let pool = init_memory_db().await.unwrap();
        let mut ids = Vec::new();
        for name in ["reader", "author"] {
            let user = users::create_user(
                &pool,
                &NewUser {
                    username: name.to_string(),
                    email: format!("{name}@example.com"),
                    password_hash: "hash".to_string(),
                    display_name: None,
                },
            )
            .await
            .unwrap();
            ids.push(user.id);
        }
        let (reader, author) = (ids[0], ids[1]);

        assert!(follow(&pool, reader, author).await.unwrap());
        assert!(!follow(&pool, reader, author).await.unwrap());
        assert!(is_following(&pool, reader, author).await.unwrap());
        assert_eq!(count_followers(&pool, author).await.unwrap(), 1);
        assert_eq!(count_following(&pool, reader).await.unwrap(), 1);

        assert!(unfollow(&pool, reader, author).await.unwrap());
        assert!(!unfollow(&pool, reader, author).await.unwrap());
        assert_eq!(count_followers(&pool, author).await.unwrap(), 0);
    }
}
