use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::AppState;
use crate::api::extract::{Json, Path, Query};
use crate::api::models::*;
use crate::auth::AuthUser;
use crate::cache::{story_key, story_list_key};
use crate::db::{
    self,
    models::{NewStory, Story, StoryStatus, UpdateStory, Visibility},
    stories::StoryFilter,
};
use crate::utils::{
    self,
    validation::{self, MAX_DESCRIPTION_LEN, MAX_TAG_LEN, MAX_TITLE_LEN},
};
use crate::{Error, Result};

const MAX_SLUG_ATTEMPTS: u32 = 1000;

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Internal(format!("Serialization failed: {e}")))
}

/// First free slug derived from the title
async fn unique_slug(state: &AppState, title: &str) -> Result<String> {
    let base = utils::slugify(title);
    for attempt in 1..=MAX_SLUG_ATTEMPTS {
        let candidate = utils::slug_candidate(&base, attempt);
        if !db::stories::slug_exists(&state.pool, &candidate).await? {
            return Ok(candidate);
        }
    }
    Err(Error::Conflict(format!(
        "Too many stories share the slug '{base}'"
    )))
}

fn cover_url(value: Option<&str>) -> Result<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(url) => Ok(Some(validation::validate_image_url(url)?.to_string())),
        None => Ok(None),
    }
}

/// Story detail; authors see every chapter, readers only published ones
async fn story_detail(state: &AppState, story: &Story, include_unpublished: bool) -> Result<StoryDetail> {
    let summary = db::stories::get_story_summary(&state.pool, story.id).await?;
    let tags = db::tags::get_tags_for_story(&state.pool, story.id).await?;
    let total_likes = db::social::count_story_likes(&state.pool, story.id).await?;
    let chapters = db::chapters::list_chapters(&state.pool, story.id, !include_unpublished).await?;

    Ok(StoryDetail {
        story: summary,
        tags,
        total_likes,
        chapters,
    })
}

/// Refresh search, cache, and author stats after a story changed
async fn story_changed(state: &AppState, story: &Story) {
    state.reindex_story(story.id).await;
    state.cache.invalidate_story(&story.slug).await;
    state.refresh_author_stats(story.author_id).await;
}

/// GET /api/stories - List public stories
pub async fn list_stories(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    Query(params): Query<StoryListParams>,
) -> Result<Json<Value>> {
    let (page, limit, offset) = state.page_window(params.page, params.limit)?;

    let cache_key = story_list_key(raw.as_deref().unwrap_or_default());
    if let Some(hit) = state.cache.get(&cache_key).await {
        debug!("Story list cache hit");
        return Ok(Json(hit));
    }

    let filter = StoryFilter {
        genre: params.genre,
        tag: params.tag.map(|t| t.trim().to_lowercase()),
        status: params.status,
        author: params.author,
    };

    let stories =
        db::stories::list_public_stories(&state.pool, &filter, params.sort, limit as i64, offset)
            .await?;
    let total = db::stories::count_public_stories(&state.pool, &filter).await?;

    let ids: Vec<i64> = stories.iter().map(|s| s.id).collect();
    let mut tags = db::tags::get_tags_for_stories(&state.pool, &ids).await?;

    let response = StoryListResponse {
        stories: stories
            .into_iter()
            .map(|story| StoryCard {
                tags: tags.remove(&story.id).unwrap_or_default(),
                story,
            })
            .collect(),
        pagination: Pagination::new(page, limit, total as usize),
    };

    let value = to_json(&response)?;
    state.cache.insert(cache_key, value.clone()).await;
    Ok(Json(value))
}

/// GET /api/stories/:slug - Story detail
pub async fn get_story(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    viewer: Option<AuthUser>,
) -> Result<Json<Value>> {
    let story = state.visible_story(&slug, viewer.as_ref()).await?;
    let is_author = viewer.as_ref().is_some_and(|v| v.id() == story.author_id);

    if is_author || !story.is_public() {
        let detail = story_detail(&state, &story, is_author).await?;
        return Ok(Json(to_json(&detail)?));
    }

    let key = story_key(&slug);
    if let Some(hit) = state.cache.get(&key).await {
        return Ok(Json(hit));
    }

    let detail = to_json(&story_detail(&state, &story, false).await?)?;
    state.cache.insert(key, detail.clone()).await;
    Ok(Json(detail))
}

/// POST /api/stories - Create a story
pub async fn create_story(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateStoryRequest>,
) -> Result<(StatusCode, Json<StoryDetail>)> {
    let title = validation::required_text("title", &req.title, MAX_TITLE_LEN)?;
    let description =
        validation::optional_text("description", req.description.as_deref(), MAX_DESCRIPTION_LEN)?;
    let genre = validation::optional_text("genre", req.genre.as_deref(), MAX_TAG_LEN)?
        .map(|g| g.to_lowercase());
    let cover_image_url = cover_url(req.cover_image_url.as_deref())?;
    let tags = validation::normalize_tags(&req.tags)?;

    let slug = unique_slug(&state, &title).await?;
    let story = db::stories::create_story(
        &state.pool,
        &NewStory {
            author_id: auth.id(),
            slug,
            title,
            description,
            genre,
            status: req.status.unwrap_or(StoryStatus::Ongoing),
            visibility: req.visibility.unwrap_or(Visibility::Draft),
            mature: req.mature.unwrap_or(false),
            cover_image_url,
        },
    )
    .await?;

    if !tags.is_empty() {
        db::tags::set_story_tags(&state.pool, story.id, &tags).await?;
    }

    info!("User {} created story {}", auth.user.username, story.slug);
    story_changed(&state, &story).await;

    let detail = story_detail(&state, &story, true).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// PUT /api/stories/:slug - Update a story
pub async fn update_story(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
    Json(req): Json<UpdateStoryRequest>,
) -> Result<Json<StoryDetail>> {
    let story = state.owned_story(&slug, &auth).await?;

    let title = match req.title {
        Some(title) => validation::required_text("title", &title, MAX_TITLE_LEN)?,
        None => story.title.clone(),
    };
    let description = match req.description {
        Some(d) => validation::optional_text("description", Some(&d), MAX_DESCRIPTION_LEN)?,
        None => story.description.clone(),
    };
    let genre = match req.genre {
        Some(g) => validation::optional_text("genre", Some(&g), MAX_TAG_LEN)?.map(|g| g.to_lowercase()),
        None => story.genre.clone(),
    };
    let cover_image_url = match req.cover_image_url {
        Some(url) => cover_url(Some(&url))?,
        None => story.cover_image_url.clone(),
    };

    let updated = db::stories::update_story(
        &state.pool,
        story.id,
        &UpdateStory {
            title,
            description,
            genre,
            status: req.status.unwrap_or(story.status),
            visibility: req.visibility.unwrap_or(story.visibility),
            mature: req.mature.unwrap_or(story.mature),
            cover_image_url,
        },
    )
    .await?;

    if let Some(tags) = req.tags {
        let tags = validation::normalize_tags(&tags)?;
        db::tags::set_story_tags(&state.pool, story.id, &tags).await?;
    }

    story_changed(&state, &updated).await;

    Ok(Json(story_detail(&state, &updated, true).await?))
}

/// DELETE /api/stories/:slug - Delete a story and everything under it
pub async fn delete_story(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
) -> Result<StatusCode> {
    let story = state.owned_story(&slug, &auth).await?;

    db::stories::delete_story(&state.pool, story.id).await?;

    if let Err(e) = state.search_index.delete_story(story.id) {
        warn!("Failed to remove story {} from index: {}", story.id, e.log_safe());
    }
    state.cache.invalidate_story(&story.slug).await;
    state.refresh_author_stats(story.author_id).await;

    info!("User {} deleted story {}", auth.user.username, story.slug);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/search - Full-text search over public stories
pub async fn search_stories(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let (page, limit, _) = state.page_window(params.page, params.limit)?;

    let results = state.search_index.search(
        &crate::indexer::SearchQuery {
            q: params.q,
            page,
            limit,
        },
        state.settings.pagination.api_max_limit,
    )?;

    let mut stories = Vec::with_capacity(results.hits.len());
    for hit in &results.hits {
        // Hits can briefly outlive their story between a delete and the index commit
        match db::stories::get_story_summary(&state.pool, hit.story_id).await {
            Ok(summary) if summary.visibility == Visibility::Public => {
                let tags = db::tags::get_tags_for_story(&state.pool, summary.id).await?;
                stories.push(StoryCard {
                    story: summary,
                    tags,
                });
            }
            Ok(_) | Err(Error::NotFound(_)) => {
                debug!("Skipping stale search hit {}", hit.story_id)
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Json(SearchResponse {
        stories,
        pagination: Pagination::new(page, limit, results.total),
    }))
}
