use axum::{extract::State, http::StatusCode};
use std::collections::HashMap;
use tracing::debug;

use super::chapters::readable_chapter;
use super::AppState;
use crate::api::extract::{Json, Path};
use crate::api::models::*;
use crate::auth::AuthUser;
use crate::db::{
    self,
    models::{ChapterStatus, Comment, CommentRow, Review},
};
use crate::notifications::{notify_user, Notice, NotificationKind};
use crate::utils::sanitize::truncate;
use crate::utils::validation::{self, MAX_COMMENT_LEN, MAX_REVIEW_LEN, MAX_TITLE_LEN};
use crate::{Error, Result};

/// Group a flat, oldest-first comment list into top-level threads
pub fn build_threads(rows: Vec<CommentRow>) -> Vec<CommentThread> {
    let mut replies: HashMap<i64, Vec<CommentRow>> = HashMap::new();
    let mut top_level = Vec::new();

    for row in rows {
        match row.parent_id {
            Some(parent_id) => replies.entry(parent_id).or_default().push(row),
            None => top_level.push(row),
        }
    }

    top_level
        .into_iter()
        .map(|comment| CommentThread {
            replies: replies.remove(&comment.id).unwrap_or_default(),
            comment,
        })
        .collect()
}

// Follows and profiles

/// POST /api/users/:username/follow
pub async fn follow_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    auth: AuthUser,
) -> Result<Json<FollowResponse>> {
    let author = db::users::get_user_by_username(&state.pool, &username).await?;
    if author.id == auth.id() {
        return Err(Error::Validation("You cannot follow yourself".to_string()));
    }

    if db::social::follow(&state.pool, auth.id(), author.id).await? {
        let follower = auth
            .user
            .display_name
            .clone()
            .unwrap_or_else(|| auth.user.username.clone());
        notify_user(
            &state.pool,
            author.id,
            auth.id(),
            Notice::new(
                NotificationKind::NewFollower,
                format!("{follower} started following you"),
                Some(format!("/users/{}", auth.user.username)),
            ),
        )
        .await;
        state.refresh_author_stats(author.id).await;
    }

    let followers = db::social::count_followers(&state.pool, author.id).await?;
    Ok(Json(FollowResponse {
        following: true,
        followers,
    }))
}

/// DELETE /api/users/:username/follow
pub async fn unfollow_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    auth: AuthUser,
) -> Result<Json<FollowResponse>> {
    let author = db::users::get_user_by_username(&state.pool, &username).await?;

    if db::social::unfollow(&state.pool, auth.id(), author.id).await? {
        state.refresh_author_stats(author.id).await;
    }

    let followers = db::social::count_followers(&state.pool, author.id).await?;
    Ok(Json(FollowResponse {
        following: false,
        followers,
    }))
}

/// GET /api/users/:username
pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    viewer: Option<AuthUser>,
) -> Result<Json<PublicProfile>> {
    let user = db::users::get_user_by_username(&state.pool, &username).await?;
    let stories = db::stories::list_stories_by_author(&state.pool, user.id, true).await?;
    let following_count = db::social::count_following(&state.pool, user.id).await?;
    let is_following = match &viewer {
        Some(v) => db::social::is_following(&state.pool, v.id(), user.id).await?,
        None => false,
    };

    Ok(Json(PublicProfile {
        stats: (&user).into(),
        username: user.username,
        display_name: user.display_name,
        bio: user.bio,
        following_count,
        is_following,
        stories,
        joined_at: user.created_at,
    }))
}

// Comments

/// GET /api/stories/:slug/chapters/:number/comments
pub async fn list_comments(
    State(state): State<AppState>,
    Path((slug, number)): Path<(String, i64)>,
    viewer: Option<AuthUser>,
) -> Result<Json<CommentListResponse>> {
    let story = state.visible_story(&slug, viewer.as_ref()).await?;
    let chapter = readable_chapter(&state, &story, number, viewer.as_ref()).await?;

    let rows = db::comments::list_comments(&state.pool, chapter.id).await?;
    let total = rows.len();

    Ok(Json(CommentListResponse {
        comments: build_threads(rows),
        total,
    }))
}

/// POST /api/stories/:slug/chapters/:number/comments
pub async fn create_comment(
    State(state): State<AppState>,
    Path((slug, number)): Path<(String, i64)>,
    auth: AuthUser,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    let story = state.visible_story(&slug, Some(&auth)).await?;
    let chapter = db::chapters::get_chapter_by_number(&state.pool, story.id, number).await?;
    if chapter.status != ChapterStatus::Published {
        return Err(Error::NotFound(format!("Chapter {number} not found")));
    }

    let content = validation::required_text("content", &req.content, MAX_COMMENT_LEN)?;

    // Replies to replies attach to the top-level comment
    let parent = match req.parent_id {
        Some(parent_id) => {
            let parent = db::comments::get_comment(&state.pool, parent_id).await?;
            if parent.chapter_id != chapter.id {
                return Err(Error::Validation(
                    "Parent comment belongs to another chapter".to_string(),
                ));
            }
            match parent.parent_id {
                Some(root_id) => Some(db::comments::get_comment(&state.pool, root_id).await?),
                None => Some(parent),
            }
        }
        None => None,
    };

    let comment = db::comments::create_comment(
        &state.pool,
        chapter.id,
        auth.id(),
        parent.as_ref().map(|p| p.id),
        &content,
    )
    .await?;

    let link = Some(format!("/stories/{}/chapters/{}#comment-{}", story.slug, number, comment.id));
    let excerpt = truncate(&content, 80);
    let commenter = auth.user.username.as_str();

    if let Some(parent) = &parent {
        notify_user(
            &state.pool,
            parent.user_id,
            auth.id(),
            Notice::new(
                NotificationKind::CommentReply,
                format!("{commenter} replied to your comment: {excerpt}"),
                link.clone(),
            ),
        )
        .await;
    }
    // The author already heard about it if they wrote the parent
    if parent.as_ref().map(|p| p.user_id) != Some(story.author_id) {
        notify_user(
            &state.pool,
            story.author_id,
            auth.id(),
            Notice::new(
                NotificationKind::NewComment,
                format!(
                    "{commenter} commented on {} chapter {}: {excerpt}",
                    story.title, number
                ),
                link,
            ),
        )
        .await;
    }

    debug!("Comment {} created on chapter {}", comment.id, chapter.id);
    Ok((StatusCode::CREATED, Json(comment)))
}

/// PUT /api/comments/:id
pub async fn update_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
    auth: AuthUser,
    Json(req): Json<UpdateCommentRequest>,
) -> Result<Json<Comment>> {
    let comment = db::comments::get_comment(&state.pool, comment_id).await?;
    if comment.user_id != auth.id() {
        return Err(Error::Forbidden(
            "Only the author can edit this comment".to_string(),
        ));
    }

    let content = validation::required_text("content", &req.content, MAX_COMMENT_LEN)?;
    let updated = db::comments::update_comment(&state.pool, comment.id, &content).await?;
    Ok(Json(updated))
}

/// DELETE /api/comments/:id - Owner or story author
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
    auth: AuthUser,
) -> Result<StatusCode> {
    let comment = db::comments::get_comment(&state.pool, comment_id).await?;

    if comment.user_id != auth.id() {
        let chapter = db::chapters::get_chapter(&state.pool, comment.chapter_id).await?;
        let story = db::stories::get_story(&state.pool, chapter.story_id).await?;
        if story.author_id != auth.id() {
            return Err(Error::Forbidden(
                "Only the commenter or the story author can delete this comment".to_string(),
            ));
        }
    }

    db::comments::delete_comment(&state.pool, comment.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Reviews

/// GET /api/stories/:slug/reviews
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    viewer: Option<AuthUser>,
) -> Result<Json<ReviewListResponse>> {
    let story = state.visible_story(&slug, viewer.as_ref()).await?;
    let reviews = db::reviews::list_reviews(&state.pool, story.id).await?;
    let (average_rating, review_count) = db::reviews::rating_summary(&state.pool, story.id).await?;

    Ok(Json(ReviewListResponse {
        reviews,
        average_rating,
        review_count,
    }))
}

/// POST /api/stories/:slug/reviews
pub async fn create_review(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let story = state.visible_story(&slug, None).await?;
    if story.author_id == auth.id() {
        return Err(Error::Forbidden(
            "You cannot review your own story".to_string(),
        ));
    }

    validation::validate_rating(req.rating)?;
    let title = validation::optional_text("title", req.title.as_deref(), MAX_TITLE_LEN)?;
    let content = validation::required_text("content", &req.content, MAX_REVIEW_LEN)?;

    let review = db::reviews::create_review(
        &state.pool,
        story.id,
        auth.id(),
        req.rating,
        title.as_deref(),
        &content,
    )
    .await?;

    state.cache.invalidate_story(&story.slug).await;
    state.reindex_story(story.id).await;

    notify_user(
        &state.pool,
        story.author_id,
        auth.id(),
        Notice::new(
            NotificationKind::NewReview,
            format!(
                "{} rated {} {}/5",
                auth.user.username, story.title, review.rating
            ),
            Some(format!("/stories/{}/reviews", story.slug)),
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(review)))
}

/// DELETE /api/stories/:slug/reviews - Remove the caller's review
pub async fn delete_review(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
) -> Result<StatusCode> {
    let story = db::stories::get_story_by_slug(&state.pool, &slug).await?;

    if !db::reviews::delete_review(&state.pool, story.id, auth.id()).await? {
        return Err(Error::NotFound("You have not reviewed this story".to_string()));
    }

    state.cache.invalidate_story(&story.slug).await;
    Ok(StatusCode::NO_CONTENT)
}

// Reading list

/// GET /api/reading-list
pub async fn get_reading_list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ReadingListResponse>> {
    let stories = db::reading_list::list_reading_list(&state.pool, auth.id()).await?;
    Ok(Json(ReadingListResponse { stories }))
}

/// POST /api/stories/:slug/save
pub async fn save_story(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
) -> Result<Json<SavedResponse>> {
    let story = state.visible_story(&slug, Some(&auth)).await?;
    db::reading_list::add_to_reading_list(&state.pool, auth.id(), story.id).await?;
    Ok(Json(SavedResponse { saved: true }))
}

/// DELETE /api/stories/:slug/save
pub async fn unsave_story(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    auth: AuthUser,
) -> Result<Json<SavedResponse>> {
    let story = db::stories::get_story_by_slug(&state.pool, &slug).await?;
    db::reading_list::remove_from_reading_list(&state.pool, auth.id(), story.id).await?;
    Ok(Json(SavedResponse { saved: false }))
}
