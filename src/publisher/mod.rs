//! Scheduled chapter publication.
//!
//! Chapters with `status = 'scheduled'` whose publish date has passed are
//! moved to `published`. Checks come from three places: an admin endpoint
//! or CLI command (unthrottled), a request middleware (throttled, spawned
//! in the background) and a periodic ticker.
//!
//! Each chapter is published on its own. One failure is recorded in the
//! report and the batch carries on. The store update is conditional on the
//! chapter still being scheduled, so two publishers racing on the same
//! chapter publish it once and notify once.

pub mod middleware;
pub mod scheduler;
pub mod store;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::db::models::DueChapter;
use crate::error::Result;

pub use scheduler::PublishScheduler;
pub use store::SqlitePublicationStore;

/// The publisher wired to SQLite
pub type Publisher = ScheduledPublisher<SqlitePublicationStore>;

/// Persistence and side effects the publisher needs
#[async_trait]
pub trait PublicationStore: Send + Sync {
    /// Scheduled chapters with a publish date at or before `now`
    async fn due_chapters(&self, now: DateTime<Utc>) -> Result<Vec<DueChapter>>;

    /// Publish one chapter; `Ok(false)` if it was no longer scheduled
    async fn mark_published(&self, chapter: &DueChapter, now: DateTime<Utc>) -> Result<bool>;

    async fn refresh_author_stats(&self, author_id: i64, now: DateTime<Utc>) -> Result<()>;

    async fn notify_publication(&self, chapter: &DueChapter) -> Result<()>;
}

/// Spaces out throttled checks to one per window
pub struct PublishThrottle {
    window: Duration,
    last_check: Mutex<Option<DateTime<Utc>>>,
}

impl PublishThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_check: Mutex::new(None),
        }
    }

    /// Claim the right to run a check at `now`
    pub async fn try_acquire(&self, now: DateTime<Utc>) -> bool {
        let mut last_check = self.last_check.lock().await;
        if let Some(last) = *last_check {
            if now < last + self.window {
                return false;
            }
        }
        *last_check = Some(now);
        true
    }

    pub async fn last_check(&self) -> Option<DateTime<Utc>> {
        *self.last_check.lock().await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishedChapter {
    pub chapter_id: i64,
    pub story_id: i64,
    pub story_slug: String,
    pub chapter_number: i64,
    pub title: String,
}

impl From<&DueChapter> for PublishedChapter {
    fn from(chapter: &DueChapter) -> Self {
        Self {
            chapter_id: chapter.id,
            story_id: chapter.story_id,
            story_slug: chapter.story_slug.clone(),
            chapter_number: chapter.chapter_number,
            title: chapter.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedChapter {
    pub chapter_id: i64,
    pub story_slug: String,
    pub chapter_number: i64,
    pub error: String,
}

/// Outcome of one publication pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishReport {
    pub checked: usize,
    pub published: Vec<PublishedChapter>,
    pub already_published: usize,
    pub failed: Vec<FailedChapter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Another check ran inside the throttle window
    Skipped,
    Completed(PublishReport),
}

pub struct ScheduledPublisher<S> {
    store: S,
    throttle: PublishThrottle,
}

impl<S: PublicationStore> ScheduledPublisher<S> {
    pub fn new(store: S, throttle_window: Duration) -> Self {
        Self {
            store,
            throttle: PublishThrottle::new(throttle_window),
        }
    }

    pub fn throttle(&self) -> &PublishThrottle {
        &self.throttle
    }

    /// Throttled check; returns `Skipped` without touching the store inside the window
    pub async fn check(&self, now: DateTime<Utc>) -> Result<CheckOutcome> {
        if !self.throttle.try_acquire(now).await {
            debug!("Publication check skipped: throttled");
            return Ok(CheckOutcome::Skipped);
        }
        Ok(CheckOutcome::Completed(self.publish_due(now).await?))
    }

    /// Publish every due chapter now, ignoring the throttle
    pub async fn publish_due(&self, now: DateTime<Utc>) -> Result<PublishReport> {
        let due = self.store.due_chapters(now).await?;
        let mut report = PublishReport {
            checked: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            debug!("No scheduled chapters due");
            return Ok(report);
        }

        let mut published = Vec::new();
        for chapter in due {
            match self.store.mark_published(&chapter, now).await {
                Ok(true) => {
                    info!(
                        "Published scheduled chapter {} of '{}'",
                        chapter.chapter_number, chapter.story_slug
                    );
                    published.push(chapter);
                }
                Ok(false) => {
                    debug!(
                        "Chapter {} of '{}' was already published",
                        chapter.chapter_number, chapter.story_slug
                    );
                    report.already_published += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to publish chapter {} of '{}': {}",
                        chapter.chapter_number,
                        chapter.story_slug,
                        e.log_safe()
                    );
                    report.failed.push(FailedChapter {
                        chapter_id: chapter.id,
                        story_slug: chapter.story_slug.clone(),
                        chapter_number: chapter.chapter_number,
                        error: e.log_safe(),
                    });
                }
            }
        }

        let authors: BTreeSet<i64> = published.iter().map(|c| c.author_id).collect();
        for author_id in authors {
            if let Err(e) = self.store.refresh_author_stats(author_id, now).await {
                warn!(
                    "Failed to refresh stats for author {}: {}",
                    author_id,
                    e.log_safe()
                );
            }
        }

        // Readers already heard about chapters that went out before a reschedule
        for chapter in published.iter().filter(|c| c.published_at.is_none()) {
            if let Err(e) = self.store.notify_publication(chapter).await {
                warn!(
                    "Failed to notify readers of chapter {}: {}",
                    chapter.id,
                    e.log_safe()
                );
            }
        }

        report.published = published.iter().map(PublishedChapter::from).collect();

        info!(
            "Publication pass: {} due, {} published, {} already published, {} failed",
            report.checked,
            report.published.len(),
            report.already_published,
            report.failed.len()
        );

        Ok(report)
    }
}
