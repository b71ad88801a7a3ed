use crate::db::{models::Tag, DbPool};
use crate::error::Result;
use chrono::Utc;
use std::collections::HashMap;

/// Get or create a tag by name
pub async fn get_or_create_tag(pool: &DbPool, name: &str) -> Result<Tag> {
    // Normalize tag name (lowercase, trim)
    let normalized = name.trim().to_lowercase();

    let existing = sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE name = ?")
        .bind(&normalized)
        .fetch_optional(pool)
        .await?;

    if let Some(tag) = existing {
        Ok(tag)
    } else {
        let tag = sqlx::query_as::<_, Tag>(
            "INSERT INTO tags (name, created_at) VALUES (?, ?) RETURNING *",
        )
        .bind(&normalized)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        Ok(tag)
    }
}

/// Get tag names for a story
pub async fn get_tags_for_story(pool: &DbPool, story_id: i64) -> Result<Vec<String>> {
    let tags: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT t.name
        FROM tags t
        JOIN story_tags st ON st.tag_id = t.id
        WHERE st.story_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(story_id)
    .fetch_all(pool)
    .await?;

    Ok(tags)
}

/// Get tags for multiple stories in a single query (batch loading to avoid N+1)
pub async fn get_tags_for_stories(
    pool: &DbPool,
    story_ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>> {
    if story_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = story_ids
        .iter()
        .enumerate()
        .map(|(i, _)| format!("?{}", i + 1))
        .collect::<Vec<_>>()
        .join(",");

    let query_str = format!(
        r#"
        SELECT st.story_id, t.name
        FROM story_tags st
        JOIN tags t ON st.tag_id = t.id
        WHERE st.story_id IN ({placeholders})
        ORDER BY st.story_id, t.name
        "#
    );

    let mut query = sqlx::query_as::<_, (i64, String)>(&query_str);
    for id in story_ids {
        query = query.bind(id);
    }

    let results: Vec<(i64, String)> = query.fetch_all(pool).await?;

    let mut tags_map: HashMap<i64, Vec<String>> = HashMap::new();
    for (story_id, tag_name) in results {
        tags_map.entry(story_id).or_default().push(tag_name);
    }

    // Ensure all story_ids have an entry (even if empty)
    for &story_id in story_ids {
        tags_map.entry(story_id).or_default();
    }

    Ok(tags_map)
}

/// Set story tags (replaces existing tags)
pub async fn set_story_tags(pool: &DbPool, story_id: i64, tag_names: &[String]) -> Result<()> {
    sqlx::query("DELETE FROM story_tags WHERE story_id = ?")
        .bind(story_id)
        .execute(pool)
        .await?;

    for tag_name in tag_names {
        let tag = get_or_create_tag(pool, tag_name).await?;
        sqlx::query("INSERT OR IGNORE INTO story_tags (story_id, tag_id) VALUES (?, ?)")
            .bind(story_id)
            .bind(tag.id)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Get all tags used by public stories with usage count
pub async fn get_tags_with_count(pool: &DbPool) -> Result<Vec<(String, i64)>> {
    let tags: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT t.name, COUNT(s.id) as count
        FROM tags t
        JOIN story_tags st ON st.tag_id = t.id
        JOIN stories s ON s.id = st.story_id AND s.visibility = 'public'
        GROUP BY t.id, t.name
        ORDER BY count DESC, t.name
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(tags)
}

/// Delete tags that aren't associated with any stories
pub async fn delete_unused_tags(pool: &DbPool) -> Result<i64> {
    let result = sqlx::query(
        r#"
        DELETE FROM tags
        WHERE id NOT IN (SELECT DISTINCT tag_id FROM story_tags)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as i64)
}
