//! In-app notification fan-out.
//!
//! Delivery honors each recipient's settings and never fails the action
//! that triggered it: errors are logged and swallowed.

use serde::Serialize;
use tracing::{debug, warn};

use crate::db::{
    self,
    models::{NewNotification, NotificationSettings, Story},
    DbPool,
};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewChapter,
    NewComment,
    CommentReply,
    NewFollower,
    NewReview,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewChapter => "new_chapter",
            NotificationKind::NewComment => "new_comment",
            NotificationKind::CommentReply => "comment_reply",
            NotificationKind::NewFollower => "new_follower",
            NotificationKind::NewReview => "new_review",
        }
    }

    /// Whether the recipient's settings allow this kind
    pub fn enabled_in(&self, settings: &NotificationSettings) -> bool {
        match self {
            NotificationKind::NewChapter => settings.new_chapters,
            NotificationKind::NewComment | NotificationKind::CommentReply => settings.comments,
            NotificationKind::NewFollower => settings.follows,
            NotificationKind::NewReview => settings.reviews,
        }
    }
}

/// A notification to deliver to one or more users
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NotificationKind,
    pub message: String,
    pub link: Option<String>,
}

impl Notice {
    pub fn new(kind: NotificationKind, message: impl Into<String>, link: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            link,
        }
    }
}

/// Deliver to one user if their settings allow it; returns whether it was stored
pub async fn deliver(pool: &DbPool, user_id: i64, notice: &Notice) -> Result<bool> {
    let settings = db::notifications::get_settings(pool, user_id).await?;
    if !notice.kind.enabled_in(&settings) {
        debug!(
            "User {} has {} notifications disabled",
            user_id,
            notice.kind.as_str()
        );
        return Ok(false);
    }

    db::notifications::create_notification(
        pool,
        &NewNotification {
            user_id,
            kind: notice.kind.as_str().to_string(),
            message: notice.message.clone(),
            link: notice.link.clone(),
        },
    )
    .await?;

    Ok(true)
}

/// Deliver to one user, skipping the actor; failures are logged
pub async fn notify_user(pool: &DbPool, recipient_id: i64, actor_id: i64, notice: Notice) {
    if recipient_id == actor_id {
        return;
    }
    if let Err(e) = deliver(pool, recipient_id, &notice).await {
        warn!(
            "Failed to deliver {} notification to user {}: {}",
            notice.kind.as_str(),
            recipient_id,
            e.log_safe()
        );
    }
}

/// Deliver to many users, skipping the actor; returns how many were stored
pub async fn fan_out(pool: &DbPool, recipients: &[i64], actor_id: i64, notice: &Notice) -> usize {
    let mut delivered = 0;
    for &recipient_id in recipients {
        if recipient_id == actor_id {
            continue;
        }
        match deliver(pool, recipient_id, notice).await {
            Ok(true) => delivered += 1,
            Ok(false) => {}
            Err(e) => warn!(
                "Failed to deliver {} notification to user {}: {}",
                notice.kind.as_str(),
                recipient_id,
                e.log_safe()
            ),
        }
    }
    delivered
}

async fn chapter_audience(pool: &DbPool, story_id: i64) -> Result<(Story, Vec<i64>)> {
    let story = db::stories::get_story(pool, story_id).await?;
    if !story.is_public() {
        return Ok((story, Vec::new()));
    }
    let ids = db::social::list_chapter_audience(pool, story.author_id, story.id).await?;
    Ok((story, ids))
}

/// Tell followers of the author and reading-list holders about a new chapter
///
/// Chapters of stories that are not public notify nobody.
pub async fn notify_new_chapter(
    pool: &DbPool,
    story_id: i64,
    chapter_number: i64,
    chapter_title: &str,
) -> usize {
    let (story, audience) = match chapter_audience(pool, story_id).await {
        Ok(found) => found,
        Err(e) => {
            warn!(
                "Failed to load audience for story {}: {}",
                story_id,
                e.log_safe()
            );
            return 0;
        }
    };

    let notice = Notice::new(
        NotificationKind::NewChapter,
        format!("New chapter in {}: {chapter_title}", story.title),
        Some(format!("/stories/{}/chapters/{chapter_number}", story.slug)),
    );

    let delivered = fan_out(pool, &audience, story.author_id, &notice).await;
    debug!(
        "Notified {} readers of chapter {} in {}",
        delivered, chapter_number, story.slug
    );
    delivered
}
