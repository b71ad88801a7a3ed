use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{
    AuthorStats, Chapter, ChapterListing, ChapterStatus, CommentRow, ContentFormat, DueChapter,
    Notification, ReviewWithAuthor, StoryStatus, StorySummary, User, Visibility,
};
use crate::db::stories::StorySort;
use crate::progress::ProgressEvent;

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    20
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit.max(1)),
        }
    }
}

// Auth

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
}

// Stories

#[derive(Debug, Clone, Deserialize)]
pub struct StoryListParams {
    pub genre: Option<String>,
    pub tag: Option<String>,
    pub status: Option<StoryStatus>,
    pub author: Option<String>,
    #[serde(default)]
    pub sort: StorySort,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Story card for listings and search results
#[derive(Debug, Clone, Serialize)]
pub struct StoryCard {
    #[serde(flatten)]
    pub story: StorySummary,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryListResponse {
    pub stories: Vec<StoryCard>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryDetail {
    #[serde(flatten)]
    pub story: StorySummary,
    pub tags: Vec<String>,
    pub total_likes: i64,
    pub chapters: Vec<ChapterListing>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStoryRequest {
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub status: Option<StoryStatus>,
    pub visibility: Option<Visibility>,
    pub mature: Option<bool>,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial story update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStoryRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub status: Option<StoryStatus>,
    pub visibility: Option<Visibility>,
    pub mature: Option<bool>,
    pub cover_image_url: Option<String>,
    pub tags: Option<Vec<String>>,
}

// Chapters

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChapterRequest {
    pub chapter_number: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub content_format: Option<ContentFormat>,
    pub author_note: Option<String>,
    pub status: Option<ChapterStatus>,
    pub scheduled_publish_date: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateChapterRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_format: Option<ContentFormat>,
    pub author_note: Option<String>,
    pub status: Option<ChapterStatus>,
    pub scheduled_publish_date: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterView {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub previous_chapter: Option<i64>,
    pub next_chapter: Option<i64>,
    pub likes: i64,
    pub liked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterListResponse {
    pub chapters: Vec<ChapterListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub likes: i64,
}

// Comments and reviews

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

/// Top-level comment with its replies
#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: CommentRow,
    pub replies: Vec<CommentRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentListResponse {
    pub comments: Vec<CommentThread>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: i64,
    pub title: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewListResponse {
    pub reviews: Vec<ReviewWithAuthor>,
    pub average_rating: Option<f64>,
    pub review_count: i64,
}

// Social

#[derive(Debug, Clone, Serialize)]
pub struct FollowResponse {
    pub following: bool,
    pub followers: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadingListResponse {
    pub stories: Vec<StorySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedResponse {
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub stats: AuthorStats,
    pub following_count: i64,
    pub is_following: bool,
    pub stories: Vec<StorySummary>,
    pub joined_at: DateTime<Utc>,
}

// Progress

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressRequest {
    pub story_slug: String,
    pub chapter_number: i64,
    pub progress: f64,
    #[serde(default)]
    pub scroll_position: f64,
    #[serde(default)]
    pub time_spent: i64,
    #[serde(default)]
    pub event: ProgressEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

// Notifications

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub unread: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub new_chapters: Option<bool>,
    pub comments: Option<bool>,
    pub follows: Option<bool>,
    pub reviews: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkedResponse {
    pub marked: u64,
}

// Dashboard

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChapterCounts {
    pub draft: i64,
    pub scheduled: i64,
    pub published: i64,
    pub private: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStory {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub visibility: Visibility,
    pub chapters: ChapterCounts,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub reviews: i64,
    pub average_rating: Option<f64>,
    pub completed_readers: i64,
    pub next_scheduled: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub stats: AuthorStats,
    pub stories: Vec<DashboardStory>,
    pub upcoming: Vec<DueChapter>,
}

// Search and site stats

#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub stories: Vec<StoryCard>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagCount {
    pub name: String,
    pub stories: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub users: i64,
    pub public_stories: i64,
    pub published_chapters: i64,
    pub scheduled_chapters: i64,
    pub total_words: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingResponse {
    pub chapters: Vec<DueChapter>,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness check response
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: String,
    pub search_index: String,
}
