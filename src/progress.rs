//! Reading progress rules.
//!
//! Clients post a heartbeat every 30 seconds while reading and one final
//! update on unload. Each post carries the seconds read since the previous
//! one, which accumulate on a single record per (user, story).

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db::{
    self,
    models::{ChapterStatus, ReadingProgress, Story, Visibility},
    DbPool,
};
use crate::error::{Error, Result};

/// Upper bound on seconds credited by one update
pub const MAX_TIME_PER_UPDATE: i64 = 600;

/// Progress percentage at which an unload marks the story completed
pub const COMPLETION_THRESHOLD: f64 = 90.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressEvent {
    #[default]
    Heartbeat,
    Unload,
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub chapter_number: i64,
    pub progress: f64,
    pub scroll_position: f64,
    pub time_spent: i64,
    pub event: ProgressEvent,
}

impl ProgressUpdate {
    pub fn validate(&self) -> Result<()> {
        if !self.progress.is_finite() || !(0.0..=100.0).contains(&self.progress) {
            return Err(Error::Validation(
                "Progress must be between 0 and 100".to_string(),
            ));
        }
        if !self.scroll_position.is_finite() || self.scroll_position < 0.0 {
            return Err(Error::Validation(
                "Scroll position must be a non-negative number".to_string(),
            ));
        }
        if self.chapter_number < 1 {
            return Err(Error::Validation(
                "Chapter number must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn credited_seconds(&self) -> i64 {
        self.time_spent.clamp(0, MAX_TIME_PER_UPDATE)
    }

    fn completes(&self) -> bool {
        self.event == ProgressEvent::Unload && self.progress >= COMPLETION_THRESHOLD
    }
}

/// Fold an update into the previous record
pub fn apply_update(
    previous: Option<&ReadingProgress>,
    user_id: i64,
    story_id: i64,
    update: &ProgressUpdate,
    now: DateTime<Utc>,
) -> ReadingProgress {
    let (time_spent_seconds, completed) = match previous {
        Some(prev) => {
            let completed = if update.completes() {
                true
            } else if prev.last_chapter_number != update.chapter_number {
                false
            } else {
                prev.completed
            };
            (prev.time_spent_seconds + update.credited_seconds(), completed)
        }
        None => (update.credited_seconds(), update.completes()),
    };

    ReadingProgress {
        user_id,
        story_id,
        last_chapter_number: update.chapter_number,
        progress: update.progress,
        scroll_position: update.scroll_position,
        time_spent_seconds,
        completed,
        last_read_at: now,
    }
}

/// Validate and store a progress update for a story the user can read
pub async fn record_progress(
    pool: &DbPool,
    user_id: i64,
    story: &Story,
    update: &ProgressUpdate,
    now: DateTime<Utc>,
) -> Result<ReadingProgress> {
    update.validate()?;

    let is_author = story.author_id == user_id;
    if story.visibility != Visibility::Public && !is_author {
        return Err(Error::NotFound(format!("Story '{}' not found", story.slug)));
    }

    let chapter = db::chapters::get_chapter_by_number(pool, story.id, update.chapter_number).await?;
    if chapter.status != ChapterStatus::Published && !is_author {
        return Err(Error::NotFound(format!(
            "Chapter {} not found",
            update.chapter_number
        )));
    }

    let previous = db::progress::get_progress(pool, user_id, story.id).await?;
    let record = apply_update(previous.as_ref(), user_id, story.id, update, now);
    db::progress::upsert_progress(pool, &record).await
}
