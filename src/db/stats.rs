use crate::db::{models::AuthorStats, DbPool};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// Recompute an author's aggregate stats with a full scan and store them
pub async fn recompute_author_stats(
    pool: &DbPool,
    author_id: i64,
    now: DateTime<Utc>,
) -> Result<AuthorStats> {
    let stats = sqlx::query_as::<_, AuthorStats>(
        r#"
        UPDATE users SET
            total_stories = (SELECT COUNT(*) FROM stories WHERE author_id = users.id),
            total_chapters = (
                SELECT COUNT(*) FROM chapters c JOIN stories s ON s.id = c.story_id
                WHERE s.author_id = users.id AND c.status = 'published'
            ),
            total_words = (
                SELECT COALESCE(SUM(c.word_count), 0) FROM chapters c
                JOIN stories s ON s.id = c.story_id
                WHERE s.author_id = users.id AND c.status = 'published'
            ),
            total_views = (
                SELECT COALESCE(SUM(views), 0) FROM stories WHERE author_id = users.id
            ),
            total_likes = (
                SELECT COUNT(*) FROM chapter_likes l
                JOIN chapters c ON c.id = l.chapter_id
                JOIN stories s ON s.id = c.story_id
                WHERE s.author_id = users.id
            ),
            followers_count = (SELECT COUNT(*) FROM follows WHERE author_id = users.id),
            stats_updated_at = ?
        WHERE id = ?
        RETURNING total_stories, total_chapters, total_words, total_views,
                  total_likes, followers_count
        "#,
    )
    .bind(now)
    .bind(author_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("User {author_id} not found")))?;

    Ok(stats)
}

/// Site-wide counters for the stats endpoint
#[derive(Debug, Clone, Default, serde::Serialize, sqlx::FromRow)]
pub struct SiteStats {
    pub users: i64,
    pub public_stories: i64,
    pub published_chapters: i64,
    pub scheduled_chapters: i64,
    pub total_words: i64,
}

pub async fn site_stats(pool: &DbPool) -> Result<SiteStats> {
    let stats = sqlx::query_as::<_, SiteStats>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS users,
            (SELECT COUNT(*) FROM stories WHERE visibility = 'public') AS public_stories,
            (SELECT COUNT(*) FROM chapters WHERE status = 'published') AS published_chapters,
            (SELECT COUNT(*) FROM chapters WHERE status = 'scheduled') AS scheduled_chapters,
            (SELECT COALESCE(SUM(word_count), 0) FROM chapters WHERE status = 'published')
                AS total_words
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::*;
    use crate::db::{chapters, init_memory_db, social, stories, users};

    async fn user(pool: &DbPool, name: &str) -> User {
        users::create_user(
            pool,
            &NewUser {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                password_hash: "hash".to_string(),
                display_name: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_recompute_counts_only_published() {
        let pool = init_memory_db().await.unwrap();
        let author = user(&pool, "author").await;
        let reader = user(&pool, "reader").await;

        let story = stories::create_story(
            &pool,
            &NewStory {
                author_id: author.id,
                slug: "tale".to_string(),
                title: "Tale".to_string(),
                description: None,
                genre: None,
                status: StoryStatus::Ongoing,
                visibility: Visibility::Public,
                mature: false,
                cover_image_url: None,
            },
        )
        .await
        .unwrap();

        for (number, status, words) in [
            (1, ChapterStatus::Published, 1200),
            (2, ChapterStatus::Draft, 800),
        ] {
            let chapter = chapters::create_chapter(
                &pool,
                &NewChapter {
                    story_id: story.id,
                    chapter_number: number,
                    title: format!("Chapter {number}"),
                    content: String::new(),
                    content_format: ContentFormat::Markdown,
                    author_note: None,
                    word_count: words,
                    status,
                    scheduled_publish_date: None,
                    timezone: None,
                    published_at: None,
                },
            )
            .await
            .unwrap();
            if status == ChapterStatus::Published {
                social::like_chapter(&pool, reader.id, chapter.id).await.unwrap();
            }
        }
        social::follow(&pool, reader.id, author.id).await.unwrap();
        stories::increment_views(&pool, story.id).await.unwrap();

        let stats = recompute_author_stats(&pool, author.id, Utc::now())
            .await
            .unwrap();
        assert_eq!(stats.total_stories, 1);
        assert_eq!(stats.total_chapters, 1);
        assert_eq!(stats.total_words, 1200);
        assert_eq!(stats.total_views, 1);
        assert_eq!(stats.total_likes, 1);
        assert_eq!(stats.followers_count, 1);

        let stored = users::get_user(&pool, author.id).await.unwrap();
        assert_eq!(stored.total_words, 1200);
        assert!(stored.stats_updated_at.is_some());

        let site = site_stats(&pool).await.unwrap();
        assert_eq!(site.users, 2);
        assert_eq!(site.published_chapters, 1);
    }
}
