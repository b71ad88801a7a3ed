use crate::db::{models::*, DbPool};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// Create a new chapter
pub async fn create_chapter(pool: &DbPool, new_chapter: &NewChapter) -> Result<Chapter> {
    let now = Utc::now();

    let chapter = sqlx::query_as::<_, Chapter>(
        r#"
        INSERT INTO chapters (
            story_id, chapter_number, title, content, content_format, author_note,
            word_count, status, scheduled_publish_date, timezone, published_at,
            views, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        RETURNING *
        "#,
    )
    .bind(new_chapter.story_id)
    .bind(new_chapter.chapter_number)
    .bind(&new_chapter.title)
    .bind(&new_chapter.content)
    .bind(new_chapter.content_format)
    .bind(&new_chapter.author_note)
    .bind(new_chapter.word_count)
    .bind(new_chapter.status)
    .bind(new_chapter.scheduled_publish_date)
    .bind(&new_chapter.timezone)
    .bind(new_chapter.published_at)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        Error::from(e).conflict_on_unique(format!(
            "Chapter {} already exists",
            new_chapter.chapter_number
        ))
    })?;

    Ok(chapter)
}

/// Get chapter by ID
pub async fn get_chapter(pool: &DbPool, chapter_id: i64) -> Result<Chapter> {
    sqlx::query_as::<_, Chapter>("SELECT * FROM chapters WHERE id = ?")
        .bind(chapter_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Chapter {chapter_id} not found")))
}

/// Get chapter by story and number
pub async fn get_chapter_by_number(
    pool: &DbPool,
    story_id: i64,
    chapter_number: i64,
) -> Result<Chapter> {
    sqlx::query_as::<_, Chapter>(
        "SELECT * FROM chapters WHERE story_id = ? AND chapter_number = ?",
    )
    .bind(story_id)
    .bind(chapter_number)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Chapter {chapter_number} not found")))
}

/// List chapters of a story; `published_only` hides everything readers can't see
pub async fn list_chapters(
    pool: &DbPool,
    story_id: i64,
    published_only: bool,
) -> Result<Vec<ChapterListing>> {
    let query = if published_only {
        r#"
        SELECT id, chapter_number, title, word_count, status, scheduled_publish_date,
               published_at, views, updated_at
        FROM chapters
        WHERE story_id = ? AND status = 'published'
        ORDER BY chapter_number
        "#
    } else {
        r#"
        SELECT id, chapter_number, title, word_count, status, scheduled_publish_date,
               published_at, views, updated_at
        FROM chapters
        WHERE story_id = ?
        ORDER BY chapter_number
        "#
    };

    let chapters = sqlx::query_as::<_, ChapterListing>(query)
        .bind(story_id)
        .fetch_all(pool)
        .await?;

    Ok(chapters)
}

/// Next free chapter number for a story
pub async fn next_chapter_number(pool: &DbPool, story_id: i64) -> Result<i64> {
    let max: Option<i64> =
        sqlx::query_scalar("SELECT MAX(chapter_number) FROM chapters WHERE story_id = ?")
            .bind(story_id)
            .fetch_one(pool)
            .await?;
    Ok(max.unwrap_or(0) + 1)
}

/// Previous and next published chapter numbers around `chapter_number`
pub async fn adjacent_published(
    pool: &DbPool,
    story_id: i64,
    chapter_number: i64,
) -> Result<(Option<i64>, Option<i64>)> {
    let previous: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(chapter_number) FROM chapters
        WHERE story_id = ? AND status = 'published' AND chapter_number < ?
        "#,
    )
    .bind(story_id)
    .bind(chapter_number)
    .fetch_one(pool)
    .await?;

    let next: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MIN(chapter_number) FROM chapters
        WHERE story_id = ? AND status = 'published' AND chapter_number > ?
        "#,
    )
    .bind(story_id)
    .bind(chapter_number)
    .fetch_one(pool)
    .await?;

    Ok((previous, next))
}

/// Update chapter content and lifecycle fields
pub async fn update_chapter(
    pool: &DbPool,
    chapter_id: i64,
    update: &UpdateChapter,
) -> Result<Chapter> {
    let chapter = sqlx::query_as::<_, Chapter>(
        r#"
        UPDATE chapters
        SET title = ?, content = ?, content_format = ?, author_note = ?, word_count = ?,
            status = ?, scheduled_publish_date = ?, timezone = ?, published_at = ?,
            updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&update.title)
    .bind(&update.content)
    .bind(update.content_format)
    .bind(&update.author_note)
    .bind(update.word_count)
    .bind(update.status)
    .bind(update.scheduled_publish_date)
    .bind(&update.timezone)
    .bind(update.published_at)
    .bind(Utc::now())
    .bind(chapter_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Chapter {chapter_id} not found")))?;

    Ok(chapter)
}

/// Delete a chapter
pub async fn delete_chapter(pool: &DbPool, chapter_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM chapters WHERE id = ?")
        .bind(chapter_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Increment chapter view counter
pub async fn increment_views(pool: &DbPool, chapter_id: i64) -> Result<()> {
    sqlx::query("UPDATE chapters SET views = views + 1 WHERE id = ?")
        .bind(chapter_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Scheduled chapters whose publish date is at or before `now`
pub async fn list_due_chapters(pool: &DbPool, now: DateTime<Utc>) -> Result<Vec<DueChapter>> {
    let chapters = sqlx::query_as::<_, DueChapter>(
        r#"
        SELECT c.id, c.story_id, s.author_id, c.chapter_number, c.title,
               s.slug AS story_slug, s.title AS story_title, c.scheduled_publish_date,
               c.published_at
        FROM chapters c
        JOIN stories s ON s.id = c.story_id
        WHERE c.status = 'scheduled'
          AND c.scheduled_publish_date IS NOT NULL
          AND c.scheduled_publish_date <= ?
        ORDER BY c.scheduled_publish_date, c.id
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(chapters)
}

/// Scheduled chapters that are still in the future
pub async fn list_upcoming_chapters(
    pool: &DbPool,
    now: DateTime<Utc>,
    author_id: Option<i64>,
) -> Result<Vec<DueChapter>> {
    scheduled_chapters(pool, Some(now), author_id).await
}

/// Every scheduled chapter of an author, including ones already past due
pub async fn list_scheduled_chapters(pool: &DbPool, author_id: i64) -> Result<Vec<DueChapter>> {
    scheduled_chapters(pool, None, Some(author_id)).await
}

async fn scheduled_chapters(
    pool: &DbPool,
    after: Option<DateTime<Utc>>,
    author_id: Option<i64>,
) -> Result<Vec<DueChapter>> {
    let mut query = String::from(
        r#"
        SELECT c.id, c.story_id, s.author_id, c.chapter_number, c.title,
               s.slug AS story_slug, s.title AS story_title, c.scheduled_publish_date,
               c.published_at
        FROM chapters c
        JOIN stories s ON s.id = c.story_id
        WHERE c.status = 'scheduled'
        "#,
    );
    if after.is_some() {
        query.push_str(" AND c.scheduled_publish_date > ?");
    }
    if author_id.is_some() {
        query.push_str(" AND s.author_id = ?");
    }
    query.push_str(" ORDER BY c.scheduled_publish_date, c.id");

    let mut q = sqlx::query_as::<_, DueChapter>(&query);
    if let Some(after) = after {
        q = q.bind(after);
    }
    if let Some(author_id) = author_id {
        q = q.bind(author_id);
    }

    Ok(q.fetch_all(pool).await?)
}

/// Publish one scheduled chapter and touch its story atomically
///
/// Returns `false` when the chapter was no longer scheduled, which happens
/// when another publisher got there first.
pub async fn publish_scheduled_chapter(
    pool: &DbPool,
    chapter_id: i64,
    story_id: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE chapters
        SET status = 'published',
            scheduled_publish_date = NULL,
            timezone = NULL,
            published_at = COALESCE(published_at, ?),
            updated_at = ?
        WHERE id = ? AND status = 'scheduled'
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(chapter_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query("UPDATE stories SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(story_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// Chapter counts for a story grouped by status
pub async fn count_by_status(pool: &DbPool, story_id: i64) -> Result<Vec<(ChapterStatus, i64)>> {
    let rows: Vec<(ChapterStatus, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM chapters WHERE story_id = ? GROUP BY status ORDER BY status",
    )
    .bind(story_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Count published chapters across the site
pub async fn count_published(pool: &DbPool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM chapters WHERE status = 'published'")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_db, stories, users};
    use chrono::{Duration, TimeZone};

    async fn setup(pool: &DbPool) -> Story {
        let user = users::create_user(
            pool,
            &NewUser {
                username: "author".to_string(),
                email: "author@example.com".to_string(),
                password_hash: "hash".to_string(),
                display_name: None,
            },
        )
        .await
        .unwrap();

        stories::create_story(
            pool,
            &NewStory {
                author_id: user.id,
                slug: "saga".to_string(),
                title: "Saga".to_string(),
                description: None,
                genre: None,
                status: StoryStatus::Ongoing,
                visibility: Visibility::Public,
                mature: false,
                cover_image_url: None,
            },
        )
        .await
        .unwrap()
    }

    fn chapter(story_id: i64, number: i64, status: ChapterStatus) -> NewChapter {
        NewChapter {
            story_id,
            chapter_number: number,
            title: format!("Chapter {number}"),
            content: "Once upon a time".to_string(),
            content_format: ContentFormat::Markdown,
            author_note: None,
            word_count: 4,
            status,
            scheduled_publish_date: None,
            timezone: None,
            published_at: None,
        }
    }

    #[tokio::test]
    async fn test_chapter_crud_and_navigation() {
        let pool = init_memory_db().await.unwrap();
        let story = setup(&pool).await;

        assert_eq!(next_chapter_number(&pool, story.id).await.unwrap(), 1);
        create_chapter(&pool, &chapter(story.id, 1, ChapterStatus::Published))
            .await
            .unwrap();
        create_chapter(&pool, &chapter(story.id, 2, ChapterStatus::Draft))
            .await
            .unwrap();
        create_chapter(&pool, &chapter(story.id, 3, ChapterStatus::Published))
            .await
            .unwrap();
        assert_eq!(next_chapter_number(&pool, story.id).await.unwrap(), 4);

        let dup = create_chapter(&pool, &chapter(story.id, 1, ChapterStatus::Draft)).await;
        assert!(matches!(dup, Err(Error::Conflict(_))));

        let visible = list_chapters(&pool, story.id, true).await.unwrap();
        assert_eq!(visible.len(), 2);
        let all = list_chapters(&pool, story.id, false).await.unwrap();
        assert_eq!(all.len(), 3);

        // Drafts are skipped when navigating
        let (prev, next) = adjacent_published(&pool, story.id, 1).await.unwrap();
        assert_eq!(prev, None);
        assert_eq!(next, Some(3));

        let counts = count_by_status(&pool, story.id).await.unwrap();
        assert!(counts.contains(&(ChapterStatus::Published, 2)));
        assert!(counts.contains(&(ChapterStatus::Draft, 1)));
    }

    #[tokio::test]
    async fn test_due_and_conditional_publish() {
        let pool = init_memory_db().await.unwrap();
        let story = setup(&pool).await;
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();

        let mut due = chapter(story.id, 1, ChapterStatus::Scheduled);
        due.scheduled_publish_date = Some(now - Duration::minutes(5));
        due.timezone = Some("Europe/Berlin".to_string());
        let due = create_chapter(&pool, &due).await.unwrap();

        let mut later = chapter(story.id, 2, ChapterStatus::Scheduled);
        later.scheduled_publish_date = Some(now + Duration::days(1));
        create_chapter(&pool, &later).await.unwrap();

        let listed = list_due_chapters(&pool, now).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, due.id);

        let upcoming = list_upcoming_chapters(&pool, now, None).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].chapter_number, 2);

        // Past-due chapters still count as scheduled until published
        let scheduled = list_scheduled_chapters(&pool, story.author_id).await.unwrap();
        let numbers: Vec<i64> = scheduled.iter().map(|c| c.chapter_number).collect();
        assert_eq!(numbers, vec![1, 2]);

        assert!(publish_scheduled_chapter(&pool, due.id, story.id, now)
            .await
            .unwrap());
        // Second attempt loses the race
        assert!(!publish_scheduled_chapter(&pool, due.id, story.id, now)
            .await
            .unwrap());

        let published = get_chapter(&pool, due.id).await.unwrap();
        assert_eq!(published.status, ChapterStatus::Published);
        assert!(list_scheduled_chapters(&pool, story.author_id)
            .await
            .unwrap()
            .iter()
            .all(|c| c.id != due.id));
        assert!(published.scheduled_publish_date.is_none());
        assert!(published.timezone.is_none());
        assert_eq!(published.published_at, Some(now));

        let story = stories::get_story(&pool, story.id).await.unwrap();
        assert_eq!(story.updated_at, now);
    }
}
