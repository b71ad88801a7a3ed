use axum::{extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::AppState;
use crate::api::extract::{Json, Path};
use crate::api::models::*;
use crate::auth::AuthUser;
use crate::db::{
    self,
    models::{Chapter, ChapterStatus, ContentFormat, NewChapter, Story, UpdateChapter},
};
use crate::notifications;
use crate::utils::sanitize;
use crate::utils::validation::{
    self, MAX_AUTHOR_NOTE_LEN, MAX_CHAPTER_CONTENT_LEN, MAX_TAG_LEN, MAX_TITLE_LEN,
};
use crate::{Error, Result};

/// Resolved lifecycle fields for a chapter write
#[derive(Debug, Clone, PartialEq)]
pub struct Lifecycle {
    pub status: ChapterStatus,
    pub scheduled_publish_date: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// The chapter becomes visible to readers for the first time
    pub first_publish: bool,
}

/// Apply the chapter status rules to a create (`previous == None`) or update
///
/// Leaving `scheduled` clears the schedule. Publishing keeps an existing
/// `published_at` and only counts as a first publish when there was none.
pub fn resolve_lifecycle(
    previous: Option<&Chapter>,
    requested_status: Option<ChapterStatus>,
    requested_date: Option<DateTime<Utc>>,
    requested_timezone: Option<String>,
    now: DateTime<Utc>,
) -> Result<Lifecycle> {
    let status = requested_status
        .or(previous.map(|c| c.status))
        .unwrap_or(ChapterStatus::Draft);
    let previous_published_at = previous.and_then(|c| c.published_at);

    match status {
        ChapterStatus::Scheduled => {
            let schedule_changed =
                previous.is_none() || requested_status.is_some() || requested_date.is_some();
            let date = requested_date
                .or_else(|| previous.and_then(|c| c.scheduled_publish_date))
                .ok_or_else(|| {
                    Error::Validation(
                        "scheduled_publish_date is required for scheduled chapters".to_string(),
                    )
                })?;
            if schedule_changed && date <= now {
                return Err(Error::Validation(
                    "scheduled_publish_date must be in the future".to_string(),
                ));
            }
            let timezone = requested_timezone.or_else(|| previous.and_then(|c| c.timezone.clone()));

            Ok(Lifecycle {
                status,
                scheduled_publish_date: Some(date),
                timezone,
                published_at: previous_published_at,
                first_publish: false,
            })
        }
        ChapterStatus::Published => Ok(Lifecycle {
            status,
            scheduled_publish_date: None,
            timezone: None,
            published_at: Some(previous_published_at.unwrap_or(now)),
            first_publish: previous_published_at.is_none(),
        }),
        ChapterStatus::Draft | ChapterStatus::Private => Ok(Lifecycle {
            status,
            scheduled_publish_date: None,
            timezone: None,
            published_at: previous_published_at,
            first_publish: false,
        }),
    }
}

/// Validated body: sanitized when HTML, with its word count
fn prepare_content(content: &str, format: ContentFormat) -> Result<(String, i64)> {
    validation::validate_length("content", content, 0, MAX_CHAPTER_CONTENT_LEN)?;
    let content = match format {
        ContentFormat::Html => sanitize::sanitize_html(content),
        ContentFormat::Markdown => content.to_string(),
    };
    let words = sanitize::word_count(&content);
    Ok((content, words))
}

fn optional_timezone(value: Option<String>) -> Result<Option<String>> {
    validation::optional_text("timezone", value.as_deref(), MAX_TAG_LEN * 2)
}

/// Load a chapter the viewer may read
pub(crate) async fn readable_chapter(
    state: &AppState,
    story: &Story,
    number: i64,
    viewer: Option<&AuthUser>,
) -> Result<Chapter> {
    let chapter = db::chapters::get_chapter_by_number(&state.pool, story.id, number).await?;
    let is_author = viewer.is_some_and(|v| v.id() == story.author_id);
    if chapter.status != ChapterStatus::Published && !is_author {
        return Err(Error::NotFound(format!("Chapter {number} not found")));
    }
    Ok(chapter)
}

/// Cache, stats and notification follow-up after a chapter write
async fn chapter_changed(state: &AppState, story: &Story, chapter: &Chapter, first_publish: bool) {
    state.cache.invalidate_story(&story.slug).await;
    if first_publish {
        if let Err(e) = db::stories::touch_story(&state.pool, story.id, Utc::now()).await {
            warn!("Failed to touch story {}: {}", story.id, e.log_safe());
        }
        notifications::notify_new_chapter(
            &state.pool,
            story.id,
            chapter.chapter_number,
            &chapter.title,
        )
        .await;
    }
    state.refresh_author_stats(story.author_id).await;
}

/// GET /api/stories/:slug/chapters
pub async fn list_chapters(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    viewer: Option<AuthUser>,
) -> Result<Json<ChapterListResponse>> {
    let story = state.visible_story(&slug, viewer.as_ref()).await?;
    let is_author = viewer.is_some_and(|v| v.id() == story.author_id);
    let chapters = db::chapters::list_chapters(&state.pool, story.id, !is_author).await?;
    Ok(Json(ChapterListResponse { chapters }))
}

/// GET /api/stories/:slug/chapters/:number
pub async fn get_chapter(
    State(state): State<AppState>,
    Path((slug, number)): Path<(String, i64)>,
    viewer: Option<AuthUser>,
) -> Result<Json<ChapterView>> {
    let story = state.visible_story(&slug, viewer.as_ref()).await?;
    let mut chapter = readable_chapter(&state, &story, number, viewer.as_ref()).await?;

    let is_author = viewer.as_ref().is_some_and(|v| v.id() == story.author_id);
    if !is_author {
        db::chapters::increment_views(&state.pool, chapter.id).await?;
        db::stories::increment_views(&state.pool, story.id).await?;
        chapter.views += 1;
    }

    let (previous_chapter, next_chapter) =
        db::chapters::adjacent_published(&state.pool, story.id, chapter.chapter_number).await?;
    let likes = db::social::count_chapter_likes(&state.pool, chapter.id).await?;
    let liked = match &viewer {
        Some(v) => db::social::has_liked(&state.pool, v.id(), chapter.id).await?,
        None => false,
    };

    Ok(Json(ChapterView {
        chapter,
        previous_chapter,
        next_chapter,
        likes,
        liked,
    }))
}

/// POST /api/stories/:slug/chapters
pub async fn create_chapter(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
    Json(req): Json<CreateChapterRequest>,
) -> Result<(StatusCode, Json<Chapter>)> {
    let story = state.owned_story(&slug, &auth).await?;

    let title = validation::required_text("title", &req.title, MAX_TITLE_LEN)?;
    let content_format = req.content_format.unwrap_or(ContentFormat::Markdown);
    let (content, word_count) = prepare_content(&req.content, content_format)?;
    let author_note =
        validation::optional_text("author_note", req.author_note.as_deref(), MAX_AUTHOR_NOTE_LEN)?;
    let lifecycle = resolve_lifecycle(
        None,
        req.status,
        req.scheduled_publish_date,
        optional_timezone(req.timezone)?,
        Utc::now(),
    )?;

    let chapter_number = match req.chapter_number {
        Some(n) if n < 1 => {
            return Err(Error::Validation(
                "chapter_number must be at least 1".to_string(),
            ))
        }
        Some(n) => n,
        None => db::chapters::next_chapter_number(&state.pool, story.id).await?,
    };

    let chapter = db::chapters::create_chapter(
        &state.pool,
        &NewChapter {
            story_id: story.id,
            chapter_number,
            title,
            content,
            content_format,
            author_note,
            word_count,
            status: lifecycle.status,
            scheduled_publish_date: lifecycle.scheduled_publish_date,
            timezone: lifecycle.timezone,
            published_at: lifecycle.published_at,
        },
    )
    .await?;

    info!(
        "Created chapter {} of {} ({})",
        chapter.chapter_number, story.slug, chapter.status
    );
    chapter_changed(&state, &story, &chapter, lifecycle.first_publish).await;

    Ok((StatusCode::CREATED, Json(chapter)))
}

/// PUT /api/stories/:slug/chapters/:number
pub async fn update_chapter(
    State(state): State<AppState>,
    Path((slug, number)): Path<(String, i64)>,
    auth: AuthUser,
    Json(req): Json<UpdateChapterRequest>,
) -> Result<Json<Chapter>> {
    let story = state.owned_story(&slug, &auth).await?;
    let current = db::chapters::get_chapter_by_number(&state.pool, story.id, number).await?;

    let title = match req.title {
        Some(title) => validation::required_text("title", &title, MAX_TITLE_LEN)?,
        None => current.title.clone(),
    };
    let content_format = req.content_format.unwrap_or(current.content_format);
    let (content, word_count) = match req.content {
        Some(content) => prepare_content(&content, content_format)?,
        None if content_format != current.content_format => {
            prepare_content(&current.content, content_format)?
        }
        None => (current.content.clone(), current.word_count),
    };
    let author_note = match req.author_note {
        Some(note) => validation::optional_text("author_note", Some(&note), MAX_AUTHOR_NOTE_LEN)?,
        None => current.author_note.clone(),
    };
    let lifecycle = resolve_lifecycle(
        Some(&current),
        req.status,
        req.scheduled_publish_date,
        optional_timezone(req.timezone)?,
        Utc::now(),
    )?;

    let chapter = db::chapters::update_chapter(
        &state.pool,
        current.id,
        &UpdateChapter {
            title,
            content,
            content_format,
            author_note,
            word_count,
            status: lifecycle.status,
            scheduled_publish_date: lifecycle.scheduled_publish_date,
            timezone: lifecycle.timezone,
            published_at: lifecycle.published_at,
        },
    )
    .await?;

    if current.status != chapter.status {
        info!(
            "Chapter {} of {} moved from {} to {}",
            chapter.chapter_number, story.slug, current.status, chapter.status
        );
    }
    chapter_changed(&state, &story, &chapter, lifecycle.first_publish).await;

    Ok(Json(chapter))
}

/// DELETE /api/stories/:slug/chapters/:number
pub async fn delete_chapter(
    State(state): State<AppState>,
    Path((slug, number)): Path<(String, i64)>,
    auth: AuthUser,
) -> Result<StatusCode> {
    let story = state.owned_story(&slug, &auth).await?;
    let chapter = db::chapters::get_chapter_by_number(&state.pool, story.id, number).await?;

    db::chapters::delete_chapter(&state.pool, chapter.id).await?;
    chapter_changed(&state, &story, &chapter, false).await;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/stories/:slug/chapters/:number/like
pub async fn like_chapter(
    State(state): State<AppState>,
    Path((slug, number)): Path<(String, i64)>,
    auth: AuthUser,
) -> Result<Json<LikeResponse>> {
    set_like(&state, &slug, number, &auth, true).await
}

/// DELETE /api/stories/:slug/chapters/:number/like
pub async fn unlike_chapter(
    State(state): State<AppState>,
    Path((slug, number)): Path<(String, i64)>,
    auth: AuthUser,
) -> Result<Json<LikeResponse>> {
    set_like(&state, &slug, number, &auth, false).await
}

async fn set_like(
    state: &AppState,
    slug: &str,
    number: i64,
    auth: &AuthUser,
    liked: bool,
) -> Result<Json<LikeResponse>> {
    let story = state.visible_story(slug, Some(auth)).await?;
    let chapter = db::chapters::get_chapter_by_number(&state.pool, story.id, number).await?;
    if chapter.status != ChapterStatus::Published {
        return Err(Error::NotFound(format!("Chapter {number} not found")));
    }

    let changed = if liked {
        db::social::like_chapter(&state.pool, auth.id(), chapter.id).await?
    } else {
        db::social::unlike_chapter(&state.pool, auth.id(), chapter.id).await?
    };
    if changed {
        state.cache.invalidate_story(&story.slug).await;
    }

    let likes = db::social::count_chapter_likes(&state.pool, chapter.id).await?;
    Ok(Json(LikeResponse { liked, likes }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn chapter(status: ChapterStatus) -> Chapter {
        Chapter {
            id: 1,
            story_id: 1,
            chapter_number: 1,
            title: "One".to_string(),
            content: "Text".to_string(),
            content_format: ContentFormat::Markdown,
            author_note: None,
            word_count: 1,
            status,
            scheduled_publish_date: None,
            timezone: None,
            published_at: None,
            views: 0,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_new_chapter_defaults_to_draft() {
        let lifecycle = resolve_lifecycle(None, None, None, None, now()).unwrap();
        assert_eq!(lifecycle.status, ChapterStatus::Draft);
        assert!(lifecycle.published_at.is_none());
        assert!(!lifecycle.first_publish);
    }

    #[test]
    fn test_schedule_must_be_in_the_future() {
        let past = now() - Duration::minutes(1);
        let result = resolve_lifecycle(None, Some(ChapterStatus::Scheduled), Some(past), None, now());
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = resolve_lifecycle(None, Some(ChapterStatus::Scheduled), Some(now()), None, now());
        assert!(matches!(result, Err(Error::Validation(_))));

        let missing = resolve_lifecycle(None, Some(ChapterStatus::Scheduled), None, None, now());
        assert!(matches!(missing, Err(Error::Validation(_))));

        let future = now() + Duration::hours(2);
        let lifecycle = resolve_lifecycle(
            None,
            Some(ChapterStatus::Scheduled),
            Some(future),
            Some("Europe/Berlin".to_string()),
            now(),
        )
        .unwrap();
        assert_eq!(lifecycle.scheduled_publish_date, Some(future));
        assert_eq!(lifecycle.timezone.as_deref(), Some("Europe/Berlin"));
    }

    #[test]
    fn test_leaving_schedule_clears_it() {
        let mut scheduled = chapter(ChapterStatus::Scheduled);
        scheduled.scheduled_publish_date = Some(now() + Duration::days(1));
        scheduled.timezone = Some("UTC".to_string());

        let draft =
            resolve_lifecycle(Some(&scheduled), Some(ChapterStatus::Draft), None, None, now())
                .unwrap();
        assert!(draft.scheduled_publish_date.is_none());
        assert!(draft.timezone.is_none());

        let published =
            resolve_lifecycle(Some(&scheduled), Some(ChapterStatus::Published), None, None, now())
                .unwrap();
        assert!(published.scheduled_publish_date.is_none());
        assert_eq!(published.published_at, Some(now()));
        assert!(published.first_publish);
    }

    #[test]
    fn test_unchanged_schedule_is_kept_on_edit() {
        let mut scheduled = chapter(ChapterStatus::Scheduled);
        let date = now() + Duration::days(1);
        scheduled.scheduled_publish_date = Some(date);

        let edited = resolve_lifecycle(Some(&scheduled), None, None, None, now()).unwrap();
        assert_eq!(edited.status, ChapterStatus::Scheduled);
        assert_eq!(edited.scheduled_publish_date, Some(date));
    }

    #[test]
    fn test_republish_keeps_original_date() {
        let mut private = chapter(ChapterStatus::Private);
        let first = now() - Duration::days(10);
        private.published_at = Some(first);

        let lifecycle =
            resolve_lifecycle(Some(&private), Some(ChapterStatus::Published), None, None, now())
                .unwrap();
        assert_eq!(lifecycle.published_at, Some(first));
        assert!(!lifecycle.first_publish);
    }

    #[test]
    fn test_html_content_is_sanitized_and_counted() {
        let (content, words) = prepare_content(
            "<p>Hello <b>brave</b> world</p><script>alert(1)</script>",
            ContentFormat::Html,
        )
        .unwrap();
        assert!(!content.contains("script"));
        assert_eq!(words, 3);

        let (raw, words) = prepare_content("# Title\n\nSome *words*", ContentFormat::Markdown).unwrap();
        assert!(raw.starts_with("# Title"));
        assert_eq!(words, 4);
    }
}
