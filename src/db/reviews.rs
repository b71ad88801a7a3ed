use crate::db::{models::*, DbPool};
use crate::error::{Error, Result};
use chrono::Utc;

/// Create a review; one per user per story
pub async fn create_review(
    pool: &DbPool,
    story_id: i64,
    user_id: i64,
    rating: i64,
    title: Option<&str>,
    content: &str,
) -> Result<Review> {
    let now = Utc::now();

    let review = sqlx::query_as::<_, Review>(
        r#"
        INSERT INTO reviews (story_id, user_id, rating, title, content, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(story_id)
    .bind(user_id)
    .bind(rating)
    .bind(title)
    .bind(content)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| Error::from(e).conflict_on_unique("You have already reviewed this story"))?;

    Ok(review)
}

/// Reviews of a story, newest first
pub async fn list_reviews(pool: &DbPool, story_id: i64) -> Result<Vec<ReviewWithAuthor>> {
    let reviews = sqlx::query_as::<_, ReviewWithAuthor>(
        r#"
        SELECT r.id, r.story_id, r.user_id, u.username, u.display_name, r.rating,
               r.title, r.content, r.created_at, r.updated_at
        FROM reviews r
        JOIN users u ON u.id = r.user_id
        WHERE r.story_id = ?
        ORDER BY r.created_at DESC, r.id DESC
        "#,
    )
    .bind(story_id)
    .fetch_all(pool)
    .await?;

    Ok(reviews)
}

/// Average rating and review count
pub async fn rating_summary(pool: &DbPool, story_id: i64) -> Result<(Option<f64>, i64)> {
    let summary: (Option<f64>, i64) =
        sqlx::query_as("SELECT AVG(rating), COUNT(*) FROM reviews WHERE story_id = ?")
            .bind(story_id)
            .fetch_one(pool)
            .await?;
    Ok(summary)
}

/// Delete the user's review of a story; returns `true` if one existed
pub async fn delete_review(pool: &DbPool, story_id: i64, user_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM reviews WHERE story_id = ? AND user_id = ?")
        .bind(story_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
