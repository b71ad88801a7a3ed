use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Chapter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ChapterStatus {
    Draft,
    Scheduled,
    Published,
    Private,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Draft => "draft",
            ChapterStatus::Scheduled => "scheduled",
            ChapterStatus::Published => "published",
            ChapterStatus::Private => "private",
        }
    }
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChapterStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ChapterStatus::Draft),
            "scheduled" => Ok(ChapterStatus::Scheduled),
            "published" => Ok(ChapterStatus::Published),
            "private" => Ok(ChapterStatus::Private),
            other => Err(Error::Validation(format!(
                "Invalid chapter status: {other}. Must be draft, scheduled, published, or private"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum StoryStatus {
    Ongoing,
    Completed,
    Hiatus,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Ongoing => "ongoing",
            StoryStatus::Completed => "completed",
            StoryStatus::Hiatus => "hiatus",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Visibility {
    Draft,
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ContentFormat {
    Markdown,
    Html,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub role: Role,
    pub total_stories: i64,
    pub total_chapters: i64,
    pub total_words: i64,
    pub total_views: i64,
    pub total_likes: i64,
    pub followers_count: i64,
    pub stats_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Story {
    pub id: i64,
    pub author_id: i64,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub status: StoryStatus,
    pub visibility: Visibility,
    pub mature: bool,
    pub cover_image_url: Option<String>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Story {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

#[derive(Debug, Clone)]
pub struct NewStory {
    pub author_id: i64,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub status: StoryStatus,
    pub visibility: Visibility,
    pub mature: bool,
    pub cover_image_url: Option<String>,
}

/// Full replacement of the editable story fields
#[derive(Debug, Clone)]
pub struct UpdateStory {
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub status: StoryStatus,
    pub visibility: Visibility,
    pub mature: bool,
    pub cover_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Story row joined with its author and aggregate counters
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StorySummary {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub status: StoryStatus,
    pub visibility: Visibility,
    pub mature: bool,
    pub cover_image_url: Option<String>,
    pub views: i64,
    pub author_id: i64,
    pub author_username: String,
    pub author_display_name: Option<String>,
    pub published_chapters: i64,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chapter {
    pub id: i64,
    pub story_id: i64,
    pub chapter_number: i64,
    pub title: String,
    pub content: String,
    pub content_format: ContentFormat,
    pub author_note: Option<String>,
    pub word_count: i64,
    pub status: ChapterStatus,
    pub scheduled_publish_date: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChapter {
    pub story_id: i64,
    pub chapter_number: i64,
    pub title: String,
    pub content: String,
    pub content_format: ContentFormat,
    pub author_note: Option<String>,
    pub word_count: i64,
    pub status: ChapterStatus,
    pub scheduled_publish_date: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Full replacement of the editable chapter fields
#[derive(Debug, Clone)]
pub struct UpdateChapter {
    pub title: String,
    pub content: String,
    pub content_format: ContentFormat,
    pub author_note: Option<String>,
    pub word_count: i64,
    pub status: ChapterStatus,
    pub scheduled_publish_date: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Chapter listing entry without the body
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChapterListing {
    pub id: i64,
    pub chapter_number: i64,
    pub title: String,
    pub word_count: i64,
    pub status: ChapterStatus,
    pub scheduled_publish_date: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub views: i64,
    pub updated_at: DateTime<Utc>,
}

/// A scheduled chapter with the story fields publication needs
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DueChapter {
    pub id: i64,
    pub story_id: i64,
    pub author_id: i64,
    pub chapter_number: i64,
    pub title: String,
    pub story_slug: String,
    pub story_title: String,
    pub scheduled_publish_date: Option<DateTime<Utc>>,
    /// Set when the chapter went out before and was rescheduled
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub chapter_id: i64,
    pub user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub parent_id: Option<i64>,
    pub content: String,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Comment {
    pub id: i64,
    pub chapter_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Review {
    pub id: i64,
    pub story_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub title: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReviewWithAuthor {
    pub id: i64,
    pub story_id: i64,
    pub user_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub rating: i64,
    pub title: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReadingProgress {
    pub user_id: i64,
    pub story_id: i64,
    pub last_chapter_number: i64,
    pub progress: f64,
    pub scroll_position: f64,
    pub time_spent_seconds: i64,
    pub completed: bool,
    pub last_read_at: DateTime<Utc>,
}

/// Progress record joined with its story for history listings
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProgressWithStory {
    pub story_id: i64,
    pub story_slug: String,
    pub story_title: String,
    pub last_chapter_number: i64,
    pub progress: f64,
    pub scroll_position: f64,
    pub time_spent_seconds: i64,
    pub completed: bool,
    pub last_read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationSettings {
    pub user_id: i64,
    pub new_chapters: bool,
    pub comments: bool,
    pub follows: bool,
    pub reviews: bool,
}

impl NotificationSettings {
    pub fn defaults_for(user_id: i64) -> Self {
        Self {
            user_id,
            new_chapters: true,
            comments: true,
            follows: true,
            reviews: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub kind: String,
    pub message: String,
    pub link: Option<String>,
}

/// Aggregate numbers recomputed for an author
#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct AuthorStats {
    pub total_stories: i64,
    pub total_chapters: i64,
    pub total_words: i64,
    pub total_views: i64,
    pub total_likes: i64,
    pub followers_count: i64,
}

impl From<&User> for AuthorStats {
    fn from(user: &User) -> Self {
        Self {
            total_stories: user.total_stories,
            total_chapters: user.total_chapters,
            total_words: user.total_words,
            total_views: user.total_views,
            total_likes: user.total_likes,
            followers_count: user.followers_count,
        }
    }
}
