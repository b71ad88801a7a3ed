use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chapterhouse::{
    api::{routes::create_router, AppState},
    config::Settings,
    db::{
        self,
        models::{ChapterStatus, ContentFormat, NewChapter},
    },
    indexer::SearchIndex,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app() -> (Router, AppState) {
    let pool = db::init_memory_db().await.expect("database");
    let index = SearchIndex::in_memory().expect("index");
    let state = AppState::new(pool, Settings::for_testing(), Arc::new(index));
    let app = create_router(state.clone(), &state.settings);
    (app, state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "correct horse battery",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");
    body["token"].as_str().expect("token").to_string()
}

async fn create_public_story(app: &Router, token: &str, title: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/stories",
        Some(token),
        Some(json!({
            "title": title,
            "description": "A long journey across the salt flats",
            "genre": "Fantasy",
            "visibility": "public",
            "tags": ["Adventure", "slow burn"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create story: {body}");
    body["slug"].as_str().expect("slug").to_string()
}

async fn publish_chapter(app: &Router, token: &str, slug: &str, title: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        &format!("/api/stories/{slug}/chapters"),
        Some(token),
        Some(json!({
            "title": title,
            "content": "The wind was cold and the road was long.",
            "status": "published",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create chapter: {body}");
    body
}

#[tokio::test]
async fn test_register_login_and_session_cookie() {
    let (app, _) = test_app().await;
    register(&app, "alice").await;

    // Duplicate username
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"username": "alice", "email": "other@example.com", "password": "long enough pw"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"login": "alice", "password": "wrong password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"login": "alice@example.com", "password": "correct horse battery"}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("session cookie")
        .to_string();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    // The cookie alone authenticates
    let session = cookie.split(';').next().unwrap().to_string();
    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::COOKIE, session)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let me: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(me["username"], "alice");
    assert!(me.get("password_hash").is_none());
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let (app, _) = test_app().await;
    let token = register(&app, "alice").await;

    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_story_slugs_visibility_and_listing() {
    let (app, _) = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    let first = create_public_story(&app, &alice, "The Long Road!").await;
    let second = create_public_story(&app, &alice, "The long road").await;
    assert_eq!(first, "the-long-road");
    assert_eq!(second, "the-long-road-2");

    let (status, draft) = send(
        &app,
        Method::POST,
        "/api/stories",
        Some(&alice),
        Some(json!({"title": "Secret Notes"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(draft["visibility"], "draft");
    assert_eq!(draft["status"], "ongoing");

    // Drafts are invisible to others
    let (status, _) = send(&app, Method::GET, "/api/stories/secret-notes", Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::GET, "/api/stories/secret-notes", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, list) = send(&app, Method::GET, "/api/stories?tag=adventure", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["pagination"]["total"], 2);
    assert_eq!(list["stories"][0]["tags"], json!(["adventure", "slow burn"]));

    let (status, _) = send(&app, Method::GET, "/api/stories?page=0", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Only the author may edit
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/stories/{first}"),
        Some(&bob),
        Some(json!({"title": "Stolen"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Hiding a story removes it from listings, cached or not
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/stories/{second}"),
        Some(&alice),
        Some(json!({"visibility": "private"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, list) = send(&app, Method::GET, "/api/stories?tag=adventure", None, None).await;
    assert_eq!(list["pagination"]["total"], 1);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/stories/{first}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &format!("/api/stories/{first}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chapter_scheduling_rules_and_reader_access() {
    let (app, _) = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let slug = create_public_story(&app, &alice, "Clockwork").await;

    let chapter = publish_chapter(&app, &alice, &slug, "Gears").await;
    assert_eq!(chapter["chapter_number"], 1);
    assert!(chapter["published_at"].is_string());
    assert_eq!(chapter["word_count"], 9);

    // A schedule in the past is rejected
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/stories/{slug}/chapters"),
        Some(&alice),
        Some(json!({
            "title": "Springs",
            "status": "scheduled",
            "scheduled_publish_date": (Utc::now() - Duration::hours(1)).to_rfc3339(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, scheduled) = send(
        &app,
        Method::POST,
        &format!("/api/stories/{slug}/chapters"),
        Some(&alice),
        Some(json!({
            "title": "Springs",
            "status": "scheduled",
            "scheduled_publish_date": (Utc::now() + Duration::days(2)).to_rfc3339(),
            "timezone": "America/Chicago",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(scheduled["chapter_number"], 2);
    assert_eq!(scheduled["timezone"], "America/Chicago");

    // Duplicate chapter number
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/stories/{slug}/chapters"),
        Some(&alice),
        Some(json!({"chapter_number": 1, "title": "Again"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Readers only see published chapters
    let (_, listing) = send(&app, Method::GET, &format!("/api/stories/{slug}/chapters"), Some(&bob), None).await;
    assert_eq!(listing["chapters"].as_array().unwrap().len(), 1);
    let (_, listing) = send(&app, Method::GET, &format!("/api/stories/{slug}/chapters"), Some(&alice), None).await;
    assert_eq!(listing["chapters"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::GET, &format!("/api/stories/{slug}/chapters/2"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, view) = send(&app, Method::GET, &format!("/api/stories/{slug}/chapters/1"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["views"], 1);
    assert!(view["next_chapter"].is_null());

    // Moving off the schedule clears it
    let (status, draft) = send(
        &app,
        Method::PUT,
        &format!("/api/stories/{slug}/chapters/2"),
        Some(&alice),
        Some(json!({"status": "draft"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(draft["scheduled_publish_date"].is_null());
    assert!(draft["timezone"].is_null());

    // Publishing it exposes the next link
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/stories/{slug}/chapters/2"),
        Some(&alice),
        Some(json!({"status": "published"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, view) = send(&app, Method::GET, &format!("/api/stories/{slug}/chapters/1"), Some(&bob), None).await;
    assert_eq!(view["next_chapter"], 2);

    let (_, story) = send(&app, Method::GET, &format!("/api/stories/{slug}"), None, None).await;
    assert_eq!(story["published_chapters"], 2);
    assert_eq!(story["views"], 2);
}

#[tokio::test]
async fn test_social_flow_notifies_the_right_people() {
    let (app, _) = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let slug = create_public_story(&app, &alice, "Lanterns").await;

    let (status, _) = send(&app, Method::POST, "/api/users/alice/follow", Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, follow) = send(&app, Method::POST, "/api/users/alice/follow", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(follow["followers"], 1);
    // Idempotent
    let (_, follow) = send(&app, Method::POST, "/api/users/alice/follow", Some(&bob), None).await;
    assert_eq!(follow["followers"], 1);

    // Followers hear about new chapters
    publish_chapter(&app, &alice, &slug, "First Light").await;
    let (_, inbox) = send(&app, Method::GET, "/api/notifications", Some(&bob), None).await;
    assert_eq!(inbox["unread"], 1);
    assert_eq!(inbox["notifications"][0]["kind"], "new_chapter");

    // Comments notify the author, replies notify the parent's author
    let (status, comment) = send(
        &app,
        Method::POST,
        &format!("/api/stories/{slug}/chapters/1/comments"),
        Some(&bob),
        Some(json!({"content": "Loved the ending"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = comment["id"].as_i64().unwrap();

    let (status, reply) = send(
        &app,
        Method::POST,
        &format!("/api/stories/{slug}/chapters/1/comments"),
        Some(&alice),
        Some(json!({"content": "Thank you!", "parent_id": comment_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // A reply to a reply hangs off the top-level comment
    let (_, nested) = send(
        &app,
        Method::POST,
        &format!("/api/stories/{slug}/chapters/1/comments"),
        Some(&bob),
        Some(json!({"content": "Any time", "parent_id": reply["id"]})),
    )
    .await;
    assert_eq!(nested["parent_id"], comment_id);

    let (_, thread) = send(&app, Method::GET, &format!("/api/stories/{slug}/chapters/1/comments"), None, None).await;
    assert_eq!(thread["total"], 3);
    assert_eq!(thread["comments"].as_array().unwrap().len(), 1);
    assert_eq!(thread["comments"][0]["replies"].as_array().unwrap().len(), 2);

    let (_, inbox) = send(&app, Method::GET, "/api/notifications", Some(&alice), None).await;
    let kinds: Vec<&str> = inbox["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    // Bob's reply to the thread counts as a comment for the author, not a reply
    assert_eq!(kinds.iter().filter(|k| **k == "new_follower").count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == "new_comment").count(), 2);
    assert!(!kinds.contains(&"comment_reply"));

    let (_, inbox) = send(&app, Method::GET, "/api/notifications?unread_only=true", Some(&bob), None).await;
    assert!(inbox["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .any(|n| n["kind"] == "comment_reply"));

    let (_, marked) = send(&app, Method::POST, "/api/notifications/read-all", Some(&bob), None).await;
    assert_eq!(marked["marked"], 2);

    // Reviews
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/stories/{slug}/reviews"),
        Some(&alice),
        Some(json!({"rating": 5, "content": "My best work"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let review = json!({"rating": 4, "title": "Warm", "content": "A cosy read"});
    let (status, _) = send(&app, Method::POST, &format!("/api/stories/{slug}/reviews"), Some(&bob), Some(review.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, Method::POST, &format!("/api/stories/{slug}/reviews"), Some(&bob), Some(review)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, reviews) = send(&app, Method::GET, &format!("/api/stories/{slug}/reviews"), None, None).await;
    assert_eq!(reviews["review_count"], 1);
    assert_eq!(reviews["average_rating"], 4.0);

    // Likes are idempotent
    send(&app, Method::POST, &format!("/api/stories/{slug}/chapters/1/like"), Some(&bob), None).await;
    let (_, like) = send(&app, Method::POST, &format!("/api/stories/{slug}/chapters/1/like"), Some(&bob), None).await;
    assert_eq!(like["likes"], 1);

    let (_, dashboard) = send(&app, Method::GET, "/api/dashboard", Some(&alice), None).await;
    assert_eq!(dashboard["stats"]["followers_count"], 1);
    assert_eq!(dashboard["stats"]["total_likes"], 1);
    assert_eq!(dashboard["stories"][0]["comments"], 3);
    assert_eq!(dashboard["stories"][0]["chapters"]["published"], 1);
}

#[tokio::test]
async fn test_muted_notifications_are_not_delivered() {
    let (app, _) = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let slug = create_public_story(&app, &alice, "Quiet Hours").await;

    let (status, settings) = send(
        &app,
        Method::PUT,
        "/api/notifications/settings",
        Some(&bob),
        Some(json!({"new_chapters": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["new_chapters"], false);
    assert_eq!(settings["comments"], true);

    send(&app, Method::POST, "/api/users/alice/follow", Some(&bob), None).await;
    publish_chapter(&app, &alice, &slug, "Hush").await;

    let (_, inbox) = send(&app, Method::GET, "/api/notifications", Some(&bob), None).await;
    assert_eq!(inbox["unread"], 0);
}

#[tokio::test]
async fn test_reading_progress_and_reading_list() {
    let (app, _) = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let slug = create_public_story(&app, &alice, "Tidewater").await;
    publish_chapter(&app, &alice, &slug, "Low Tide").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/progress",
        Some(&bob),
        Some(json!({"story_slug": slug, "chapter_number": 1, "progress": 140.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, record) = send(
        &app,
        Method::POST,
        "/api/progress",
        Some(&bob),
        Some(json!({"story_slug": slug, "chapter_number": 1, "progress": 40.0, "time_spent": 30})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["completed"], false);

    let (_, record) = send(
        &app,
        Method::POST,
        "/api/progress",
        Some(&bob),
        Some(json!({
            "story_slug": slug,
            "chapter_number": 1,
            "progress": 95.0,
            "time_spent": 5000,
            "event": "unload",
        })),
    )
    .await;
    assert_eq!(record["completed"], true);
    assert_eq!(record["time_spent_seconds"], 630);

    let (status, _) = send(&app, Method::GET, &format!("/api/progress/{slug}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &format!("/api/progress/{slug}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, history) = send(&app, Method::GET, "/api/progress", Some(&bob), None).await;
    assert_eq!(history[0]["story_slug"], slug);

    let (_, saved) = send(&app, Method::POST, &format!("/api/stories/{slug}/save"), Some(&bob), None).await;
    assert_eq!(saved["saved"], true);
    let (_, list) = send(&app, Method::GET, "/api/reading-list", Some(&bob), None).await;
    assert_eq!(list["stories"][0]["slug"], slug);
}

#[tokio::test]
async fn test_search_and_admin_endpoints() {
    let (app, state) = test_app().await;
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    create_public_story(&app, &alice, "Salt and Starlight").await;

    let (status, results) = send(&app, Method::GET, "/api/search?q=starlight", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["pagination"]["total"], 1);
    assert_eq!(results["stories"][0]["slug"], "salt-and-starlight");

    let (status, _) = send(&app, Method::POST, "/api/admin/publish-scheduled", Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    chapterhouse::cli::commands::promote(&state.pool, "bob").await.unwrap();
    let (status, report) = send(&app, Method::POST, "/api/admin/publish-scheduled", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["checked"], 0);

    let (status, upcoming) = send(&app, Method::GET, "/api/admin/scheduled", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(upcoming["chapters"].as_array().unwrap().is_empty());

    let (_, stats) = send(&app, Method::GET, "/api/stats", None, None).await;
    assert_eq!(stats["users"], 2);
    assert_eq!(stats["public_stories"], 1);
}

#[tokio::test]
async fn test_scheduled_publication_refreshes_cached_story() {
    let (app, state) = test_app().await;
    let alice = register(&app, "alice").await;
    let slug = create_public_story(&app, &alice, "Salt Road").await;
    publish_chapter(&app, &alice, &slug, "Departure").await;

    // Warm the anonymous detail and listing caches
    let (status, detail) = send(&app, Method::GET, &format!("/api/stories/{slug}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["chapters"].as_array().unwrap().len(), 1);
    let (_, listing) = send(&app, Method::GET, "/api/stories", None, None).await;
    assert_eq!(listing["stories"][0]["published_chapters"], 1);

    let story = db::stories::get_story_by_slug(&state.pool, &slug).await.unwrap();
    db::chapters::create_chapter(
        &state.pool,
        &NewChapter {
            story_id: story.id,
            chapter_number: 2,
            title: "The Crossing".to_string(),
            content: "Salt crunched under every step.".to_string(),
            content_format: ContentFormat::Markdown,
            author_note: None,
            word_count: 5,
            status: ChapterStatus::Scheduled,
            scheduled_publish_date: Some(Utc::now() - Duration::minutes(1)),
            timezone: None,
            published_at: None,
        },
    )
    .await
    .unwrap();

    state.publisher.publish_due(Utc::now()).await.unwrap();

    let (_, detail) = send(&app, Method::GET, &format!("/api/stories/{slug}"), None, None).await;
    let titles: Vec<&str> = detail["chapters"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Departure", "The Crossing"]);
    let (_, listing) = send(&app, Method::GET, "/api/stories", None, None).await;
    assert_eq!(listing["stories"][0]["published_chapters"], 2);
}

#[tokio::test]
async fn test_malformed_input_gets_json_error() {
    let (app, _) = test_app().await;
    let alice = register(&app, "alice").await;
    let slug = create_public_story(&app, &alice, "Salt Road").await;
    publish_chapter(&app, &alice, &slug, "Departure").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/progress",
        Some(&alice),
        Some(json!({"story_slug": slug, "chapter_number": 1, "progress": 10.0, "event": "teleport"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(&app, Method::GET, "/api/stories?page=first", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/stories/{slug}/chapters/one"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
