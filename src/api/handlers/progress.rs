use axum::extract::State;
use chrono::Utc;

use super::AppState;
use crate::api::extract::{Json, Path, Query};
use crate::api::models::{LimitParams, ProgressRequest};
use crate::auth::AuthUser;
use crate::db::{
    self,
    models::{ProgressWithStory, ReadingProgress},
};
use crate::progress::{record_progress, ProgressUpdate};
use crate::{Error, Result};

/// POST /api/progress - Heartbeat or unload update from the reader
pub async fn update_progress(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ProgressRequest>,
) -> Result<Json<ReadingProgress>> {
    let story = state.visible_story(&req.story_slug, Some(&auth)).await?;

    let update = ProgressUpdate {
        chapter_number: req.chapter_number,
        progress: req.progress,
        scroll_position: req.scroll_position,
        time_spent: req.time_spent,
        event: req.event,
    };

    let record = record_progress(&state.pool, auth.id(), &story, &update, Utc::now()).await?;
    Ok(Json(record))
}

/// GET /api/progress - Reading history, newest first
pub async fn list_progress(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<ProgressWithStory>>> {
    let limit = params.limit.clamp(1, state.settings.pagination.api_max_limit);
    let records = db::progress::list_progress_for_user(&state.pool, auth.id(), limit as i64).await?;
    Ok(Json(records))
}

/// GET /api/progress/:slug
pub async fn get_story_progress(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
) -> Result<Json<ReadingProgress>> {
    let story = state.visible_story(&slug, Some(&auth)).await?;
    db::progress::get_progress(&state.pool, auth.id(), story.id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("No reading progress for '{slug}'")))
}
