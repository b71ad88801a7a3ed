pub mod admin;
pub mod auth;
pub mod chapters;
pub mod dashboard;
pub mod notifications;
pub mod progress;
pub mod social;
pub mod stories;

use axum::extract::State;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::extract::Json;
use crate::api::models::*;
use crate::auth::AuthUser;
use crate::cache::ResponseCache;
use crate::config::Settings;
use crate::db::{self, models::Story, DbPool};
use crate::indexer::SearchIndex;
use crate::publisher::{Publisher, SqlitePublicationStore};
use crate::{Error, Result};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub settings: Settings,
    pub cache: ResponseCache,
    pub search_index: Arc<SearchIndex>,
    pub publisher: Arc<Publisher>,
}

impl AppState {
    pub fn new(pool: DbPool, settings: Settings, search_index: Arc<SearchIndex>) -> Self {
        let cache = ResponseCache::new(std::time::Duration::from_secs(
            settings.cache.ttl_seconds,
        ));
        let store = SqlitePublicationStore::new(pool.clone(), cache.clone());
        let throttle = Duration::seconds(settings.publisher.throttle_seconds as i64);
        let publisher = Arc::new(Publisher::new(store, throttle));

        Self {
            pool,
            settings,
            cache,
            search_index,
            publisher,
        }
    }

    /// Validate page/limit, returning `(page, limit, offset)`
    pub fn page_window(&self, page: usize, limit: usize) -> Result<(usize, usize, i64)> {
        if page == 0 {
            return Err(Error::Validation("Page must be at least 1".to_string()));
        }
        if page > self.settings.pagination.max_pages {
            return Err(Error::Validation(format!(
                "Page must be at most {}",
                self.settings.pagination.max_pages
            )));
        }
        let limit = limit.clamp(1, self.settings.pagination.api_max_limit);
        let offset = ((page - 1) * limit) as i64;
        Ok((page, limit, offset))
    }

    /// Load a story the viewer may see; hidden stories look missing
    pub async fn visible_story(&self, slug: &str, viewer: Option<&AuthUser>) -> Result<Story> {
        let story = db::stories::get_story_by_slug(&self.pool, slug).await?;
        if story.is_public() || viewer.is_some_and(|v| v.id() == story.author_id) {
            Ok(story)
        } else {
            Err(Error::NotFound(format!("Story '{slug}' not found")))
        }
    }

    /// Load a story the user authored; 403 for anyone else
    pub async fn owned_story(&self, slug: &str, user: &AuthUser) -> Result<Story> {
        let story = self.visible_story(slug, Some(user)).await?;
        if story.author_id != user.id() {
            return Err(Error::Forbidden(
                "Only the author can modify this story".to_string(),
            ));
        }
        Ok(story)
    }

    /// Refresh the search document of a story; failures are logged
    pub async fn reindex_story(&self, story_id: i64) {
        let result = async {
            let summary = db::stories::get_story_summary(&self.pool, story_id).await?;
            let tags = db::tags::get_tags_for_story(&self.pool, story_id).await?;
            self.search_index.upsert_story(&summary, &tags)
        };
        if let Err(e) = result.await {
            warn!("Failed to index story {}: {}", story_id, e.log_safe());
        }
    }

    /// Recompute an author's stats; failures are logged
    pub async fn refresh_author_stats(&self, author_id: i64) {
        if let Err(e) =
            db::stats::recompute_author_stats(&self.pool, author_id, chrono::Utc::now()).await
        {
            warn!(
                "Failed to refresh stats for author {}: {}",
                author_id,
                e.log_safe()
            );
        }
    }
}

/// GET /api/stats - Site statistics
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    debug!("Get stats request");

    let stats = db::stats::site_stats(&state.pool).await?;

    Ok(Json(StatsResponse {
        users: stats.users,
        public_stories: stats.public_stories,
        published_chapters: stats.published_chapters,
        scheduled_chapters: stats.scheduled_chapters,
        total_words: stats.total_words,
    }))
}

/// GET /api/tags - Tags on public stories with counts
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagCount>>> {
    let tags = db::tags::get_tags_with_count(&state.pool).await?;
    Ok(Json(
        tags.into_iter()
            .map(|(name, stories)| TagCount { name, stories })
            .collect(),
    ))
}

/// GET /health - Health check endpoint
pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

/// GET /ready - Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> Result<Json<ReadinessResponse>> {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();

    // Search index is always ready if it was initialized
    let index_healthy = true;

    Ok(Json(ReadinessResponse {
        ready: db_healthy && index_healthy,
        database: if db_healthy { "ok" } else { "error" }.to_string(),
        search_index: if index_healthy { "ok" } else { "error" }.to_string(),
    }))
}
