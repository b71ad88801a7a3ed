use axum::{extract::State, http::StatusCode};

use super::AppState;
use crate::api::extract::{Json, Path, Query};
use crate::api::models::*;
use crate::auth::AuthUser;
use crate::db::{self, models::NotificationSettings};
use crate::Result;

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<NotificationParams>,
) -> Result<Json<NotificationListResponse>> {
    let limit = params.limit.clamp(1, state.settings.pagination.api_max_limit);
    let notifications = db::notifications::list_notifications(
        &state.pool,
        auth.id(),
        params.unread_only,
        limit as i64,
    )
    .await?;
    let unread = db::notifications::count_unread(&state.pool, auth.id()).await?;

    Ok(Json(NotificationListResponse {
        notifications,
        unread,
    }))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<i64>,
    auth: AuthUser,
) -> Result<StatusCode> {
    db::notifications::mark_read(&state.pool, auth.id(), notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MarkedResponse>> {
    let marked = db::notifications::mark_all_read(&state.pool, auth.id()).await?;
    Ok(Json(MarkedResponse { marked }))
}

/// GET /api/notifications/settings
pub async fn get_settings(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<NotificationSettings>> {
    Ok(Json(
        db::notifications::get_settings(&state.pool, auth.id()).await?,
    ))
}

/// PUT /api/notifications/settings - Partial update
pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<NotificationSettings>> {
    let current = db::notifications::get_settings(&state.pool, auth.id()).await?;

    let settings = NotificationSettings {
        user_id: auth.id(),
        new_chapters: req.new_chapters.unwrap_or(current.new_chapters),
        comments: req.comments.unwrap_or(current.comments),
        follows: req.follows.unwrap_or(current.follows),
        reviews: req.reviews.unwrap_or(current.reviews),
    };

    Ok(Json(
        db::notifications::upsert_settings(&state.pool, &settings).await?,
    ))
}
