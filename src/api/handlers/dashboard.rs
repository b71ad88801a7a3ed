use axum::extract::State;
use chrono::{DateTime, Utc};

use super::AppState;
use crate::api::extract::Json;
use crate::api::models::*;
use crate::auth::AuthUser;
use crate::db::{
    self,
    models::{ChapterStatus, DueChapter},
};
use crate::Result;

fn chapter_counts(rows: &[(ChapterStatus, i64)]) -> ChapterCounts {
    let mut counts = ChapterCounts::default();
    for (status, count) in rows {
        match status {
            ChapterStatus::Draft => counts.draft = *count,
            ChapterStatus::Scheduled => counts.scheduled = *count,
            ChapterStatus::Published => counts.published = *count,
            ChapterStatus::Private => counts.private = *count,
        }
    }
    counts
}

/// Earliest scheduled date for a story; `scheduled` is ordered by publish date
fn next_scheduled(scheduled: &[DueChapter], story_id: i64) -> Option<DateTime<Utc>> {
    scheduled
        .iter()
        .find(|c| c.story_id == story_id)
        .and_then(|c| c.scheduled_publish_date)
}

/// GET /api/dashboard - The caller's stories and freshly recomputed stats
pub async fn get_dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DashboardResponse>> {
    let now = Utc::now();
    let stats = db::stats::recompute_author_stats(&state.pool, auth.id(), now).await?;
    let upcoming = db::chapters::list_upcoming_chapters(&state.pool, now, Some(auth.id())).await?;
    let scheduled = db::chapters::list_scheduled_chapters(&state.pool, auth.id()).await?;
    let summaries = db::stories::list_stories_by_author(&state.pool, auth.id(), false).await?;

    let mut stories = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let rows = db::chapters::count_by_status(&state.pool, summary.id).await?;
        let likes = db::social::count_story_likes(&state.pool, summary.id).await?;
        let comments = db::comments::count_story_comments(&state.pool, summary.id).await?;
        let completed_readers =
            db::progress::count_completed_readers(&state.pool, summary.id).await?;

        stories.push(DashboardStory {
            id: summary.id,
            slug: summary.slug,
            title: summary.title,
            visibility: summary.visibility,
            chapters: chapter_counts(&rows),
            views: summary.views,
            likes,
            comments,
            reviews: summary.review_count,
            average_rating: summary.average_rating,
            completed_readers,
            next_scheduled: next_scheduled(&scheduled, summary.id),
        });
    }

    Ok(Json(DashboardResponse {
        stats,
        stories,
        upcoming,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_chapter_counts_fill_missing_statuses_with_zero() {
        let counts = chapter_counts(&[(ChapterStatus::Published, 4), (ChapterStatus::Scheduled, 1)]);
        assert_eq!(counts.published, 4);
        assert_eq!(counts.scheduled, 1);
        assert_eq!(counts.draft, 0);
        assert_eq!(counts.private, 0);
    }

    #[test]
    fn test_next_scheduled_includes_past_due_chapters() {
        let t = |h| Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap();
        let chapter = |id, story_id, at| DueChapter {
            id,
            story_id,
            author_id: 1,
            chapter_number: id,
            title: format!("Chapter {id}"),
            story_slug: format!("story-{story_id}"),
            story_title: format!("Story {story_id}"),
            scheduled_publish_date: Some(at),
            published_at: None,
        };
        // Ordered by date, the first one is already overdue
        let scheduled = vec![chapter(1, 10, t(8)), chapter(2, 20, t(9)), chapter(3, 10, t(12))];

        assert_eq!(next_scheduled(&scheduled, 10), Some(t(8)));
        assert_eq!(next_scheduled(&scheduled, 20), Some(t(9)));
        assert_eq!(next_scheduled(&scheduled, 30), None);
    }
}
