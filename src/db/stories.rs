use crate::db::{models::*, DbPool};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};

pub(crate) const SUMMARY_SELECT: &str = r#"
    SELECT s.id, s.slug, s.title, s.description, s.genre, s.status, s.visibility,
           s.mature, s.cover_image_url, s.views, s.author_id,
           u.username AS author_username, u.display_name AS author_display_name,
           (SELECT COUNT(*) FROM chapters c
             WHERE c.story_id = s.id AND c.status = 'published') AS published_chapters,
           (SELECT AVG(r.rating) FROM reviews r WHERE r.story_id = s.id) AS average_rating,
           (SELECT COUNT(*) FROM reviews r WHERE r.story_id = s.id) AS review_count,
           s.created_at, s.updated_at
    FROM stories s
    JOIN users u ON u.id = s.author_id
"#;

/// Listing order for public stories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorySort {
    #[default]
    Updated,
    New,
    Popular,
    Rating,
}

impl StorySort {
    fn order_by(&self) -> &'static str {
        match self {
            StorySort::Updated => " ORDER BY s.updated_at DESC, s.id DESC",
            StorySort::New => " ORDER BY s.created_at DESC, s.id DESC",
            StorySort::Popular => " ORDER BY s.views DESC, s.id DESC",
            StorySort::Rating => " ORDER BY COALESCE(average_rating, 0) DESC, review_count DESC, s.id DESC",
        }
    }
}

/// Filters for public story listings
#[derive(Debug, Clone, Default)]
pub struct StoryFilter {
    pub genre: Option<String>,
    pub tag: Option<String>,
    pub status: Option<StoryStatus>,
    pub author: Option<String>,
}

impl StoryFilter {
    fn push_conditions<'a>(&'a self, builder: &mut QueryBuilder<'a, Sqlite>) {
        builder.push(" WHERE s.visibility = 'public'");

        if let Some(genre) = &self.genre {
            builder.push(" AND s.genre = ").push_bind(genre);
        }
        if let Some(status) = self.status {
            builder.push(" AND s.status = ").push_bind(status);
        }
        if let Some(author) = &self.author {
            builder
                .push(" AND u.username = ")
                .push_bind(author)
                .push(" COLLATE NOCASE");
        }
        if let Some(tag) = &self.tag {
            builder
                .push(
                    " AND EXISTS (SELECT 1 FROM story_tags st JOIN tags t ON t.id = st.tag_id \
                     WHERE st.story_id = s.id AND t.name = ",
                )
                .push_bind(tag)
                .push(")");
        }
    }
}

/// Create a new story
pub async fn create_story(pool: &DbPool, new_story: &NewStory) -> Result<Story> {
    let now = Utc::now();

    let story = sqlx::query_as::<_, Story>(
        r#"
        INSERT INTO stories (
            author_id, slug, title, description, genre, status, visibility,
            mature, cover_image_url, views, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        RETURNING *
        "#,
    )
    .bind(new_story.author_id)
    .bind(&new_story.slug)
    .bind(&new_story.title)
    .bind(&new_story.description)
    .bind(&new_story.genre)
    .bind(new_story.status)
    .bind(new_story.visibility)
    .bind(new_story.mature)
    .bind(&new_story.cover_image_url)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| Error::from(e).conflict_on_unique("Story slug already exists"))?;

    Ok(story)
}

/// Get story by ID
pub async fn get_story(pool: &DbPool, story_id: i64) -> Result<Story> {
    sqlx::query_as::<_, Story>("SELECT * FROM stories WHERE id = ?")
        .bind(story_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Story {story_id} not found")))
}

/// Get story by slug
pub async fn get_story_by_slug(pool: &DbPool, slug: &str) -> Result<Story> {
    sqlx::query_as::<_, Story>("SELECT * FROM stories WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Story '{slug}' not found")))
}

/// Check whether a slug is taken
pub async fn slug_exists(pool: &DbPool, slug: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stories WHERE slug = ?")
        .bind(slug)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Get story summary by ID (any visibility)
pub async fn get_story_summary(pool: &DbPool, story_id: i64) -> Result<StorySummary> {
    let query = format!("{SUMMARY_SELECT} WHERE s.id = ?");
    sqlx::query_as::<_, StorySummary>(&query)
        .bind(story_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Story {story_id} not found")))
}

/// List public stories
pub async fn list_public_stories(
    pool: &DbPool,
    filter: &StoryFilter,
    sort: StorySort,
    limit: i64,
    offset: i64,
) -> Result<Vec<StorySummary>> {
    let mut builder = QueryBuilder::<Sqlite>::new(SUMMARY_SELECT);
    filter.push_conditions(&mut builder);
    builder.push(sort.order_by());
    builder.push(" LIMIT ").push_bind(limit);
    builder.push(" OFFSET ").push_bind(offset);

    let stories = builder
        .build_query_as::<StorySummary>()
        .fetch_all(pool)
        .await?;

    Ok(stories)
}

/// Count public stories matching a filter
pub async fn count_public_stories(pool: &DbPool, filter: &StoryFilter) -> Result<i64> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT COUNT(*) FROM stories s JOIN users u ON u.id = s.author_id",
    );
    filter.push_conditions(&mut builder);

    let count = builder
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// List all stories of an author, optionally only public ones
pub async fn list_stories_by_author(
    pool: &DbPool,
    author_id: i64,
    public_only: bool,
) -> Result<Vec<StorySummary>> {
    let query = if public_only {
        format!(
            "{SUMMARY_SELECT} WHERE s.author_id = ? AND s.visibility = 'public' ORDER BY s.updated_at DESC"
        )
    } else {
        format!("{SUMMARY_SELECT} WHERE s.author_id = ? ORDER BY s.updated_at DESC")
    };

    let stories = sqlx::query_as::<_, StorySummary>(&query)
        .bind(author_id)
        .fetch_all(pool)
        .await?;

    Ok(stories)
}

/// List every public story (for reindexing)
pub async fn list_all_public(pool: &DbPool) -> Result<Vec<StorySummary>> {
    let query = format!("{SUMMARY_SELECT} WHERE s.visibility = 'public' ORDER BY s.id");
    let stories = sqlx::query_as::<_, StorySummary>(&query)
        .fetch_all(pool)
        .await?;
    Ok(stories)
}

/// Update story metadata
pub async fn update_story(pool: &DbPool, story_id: i64, update: &UpdateStory) -> Result<Story> {
    let story = sqlx::query_as::<_, Story>(
        r#"
        UPDATE stories
        SET title = ?, description = ?, genre = ?, status = ?, visibility = ?,
            mature = ?, cover_image_url = ?, updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&update.title)
    .bind(&update.description)
    .bind(&update.genre)
    .bind(update.status)
    .bind(update.visibility)
    .bind(update.mature)
    .bind(&update.cover_image_url)
    .bind(Utc::now())
    .bind(story_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Story {story_id} not found")))?;

    Ok(story)
}

/// Bump a story's updated_at
pub async fn touch_story(pool: &DbPool, story_id: i64, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE stories SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(story_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Increment story view counter
pub async fn increment_views(pool: &DbPool, story_id: i64) -> Result<()> {
    sqlx::query("UPDATE stories SET views = views + 1 WHERE id = ?")
        .bind(story_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete a story; chapters and everything hanging off them cascade
pub async fn delete_story(pool: &DbPool, story_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM stories WHERE id = ?")
        .bind(story_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Count stories by visibility
pub async fn count_stories(pool: &DbPool, visibility: Option<Visibility>) -> Result<i64> {
    let count = if let Some(visibility) = visibility {
        sqlx::query_scalar("SELECT COUNT(*) FROM stories WHERE visibility = ?")
            .bind(visibility)
            .fetch_one(pool)
            .await?
    } else {
        sqlx::query_scalar("SELECT COUNT(*) FROM stories")
            .fetch_one(pool)
            .await?
    };

    Ok(count)
}
