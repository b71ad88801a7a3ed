use axum::extract::State;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use super::AppState;
use crate::api::extract::Json;
use crate::api::models::UpcomingResponse;
use crate::auth::RequireAdmin;
use crate::db;
use crate::indexer;
use crate::publisher::PublishReport;
use crate::Result;

/// POST /api/admin/publish-scheduled - Publish everything due, unthrottled
pub async fn publish_scheduled(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<PublishReport>> {
    info!("Admin {} triggered scheduled publication", admin.user.username);
    let report = state.publisher.publish_due(Utc::now()).await?;
    Ok(Json(report))
}

/// GET /api/admin/scheduled - Chapters waiting for their publish date
pub async fn list_scheduled(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<UpcomingResponse>> {
    let chapters = db::chapters::list_upcoming_chapters(&state.pool, Utc::now(), None).await?;
    Ok(Json(UpcomingResponse { chapters }))
}

/// POST /api/admin/reindex - Rebuild the search index
pub async fn reindex(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<Value>> {
    let indexed = indexer::rebuild_from_db(&state.pool, &state.search_index).await?;
    state.cache.clear().await;
    info!("Admin {} rebuilt the search index ({} stories)", admin.user.username, indexed);
    Ok(Json(json!({ "indexed": indexed })))
}
