use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::PublicationStore;
use crate::cache::ResponseCache;
use crate::db::{self, models::DueChapter, DbPool};
use crate::error::Result;
use crate::notifications;

/// Publication backed by SQLite; invalidates cached story responses
#[derive(Clone)]
pub struct SqlitePublicationStore {
    pool: DbPool,
    cache: ResponseCache,
}

impl SqlitePublicationStore {
    pub fn new(pool: DbPool, cache: ResponseCache) -> Self {
        Self { pool, cache }
    }
}

#[async_trait]
impl PublicationStore for SqlitePublicationStore {
    async fn due_chapters(&self, now: DateTime<Utc>) -> Result<Vec<DueChapter>> {
        db::chapters::list_due_chapters(&self.pool, now).await
    }

    async fn mark_published(&self, chapter: &DueChapter, now: DateTime<Utc>) -> Result<bool> {
        let published =
            db::chapters::publish_scheduled_chapter(&self.pool, chapter.id, chapter.story_id, now)
                .await?;
        if published {
            self.cache.invalidate_story(&chapter.story_slug).await;
        }
        Ok(published)
    }

    async fn refresh_author_stats(&self, author_id: i64, now: DateTime<Utc>) -> Result<()> {
        db::stats::recompute_author_stats(&self.pool, author_id, now).await?;
        Ok(())
    }

    async fn notify_publication(&self, chapter: &DueChapter) -> Result<()> {
        notifications::notify_new_chapter(
            &self.pool,
            chapter.story_id,
            chapter.chapter_number,
            &chapter.title,
        )
        .await;
        Ok(())
    }
}
