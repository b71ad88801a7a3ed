use axum::extract::ConnectInfo;
use axum::http::{header, HeaderValue, Method};
use axum::{
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::KeyExtractor, GovernorError, GovernorLayer,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::warn;

use crate::api::handlers::{
    self as api_handlers, admin, auth, chapters, dashboard, notifications, progress, social,
    stories, AppState,
};
use crate::config::Settings;
use crate::error::Error;
use crate::publisher::middleware::auto_publish;

/// Rate-limit key: the peer address, or localhost when the connection info is missing
#[derive(Clone, Copy, Debug)]
struct FallbackIpKeyExtractor;

impl KeyExtractor for FallbackIpKeyExtractor {
    type Key = IpAddr;

    fn extract<B>(
        &self,
        req: &axum::http::Request<B>,
    ) -> Result<Self::Key, tower_governor::GovernorError> {
        if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
            return Ok(addr.ip());
        }

        Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

/// Render limiter rejections with the same JSON error body as handlers
fn governor_error(error: GovernorError) -> Response {
    match error {
        GovernorError::TooManyRequests { headers, .. } => {
            let mut response = Error::RateLimited.into_response();
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => {
            Error::Internal("unable to determine client address".to_string()).into_response()
        }
        GovernorError::Other { code, msg, headers } => {
            let message = msg.unwrap_or_else(|| "request rejected".to_string());
            let mut response = (code, axum::Json(serde_json::json!({ "error": message })))
                .into_response();
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
    }
}

fn api_router(state: AppState) -> Router {
    Router::new()
        // Sessions
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me).put(auth::update_me))
        // Stories
        .route(
            "/stories",
            get(stories::list_stories).post(stories::create_story),
        )
        .route(
            "/stories/:slug",
            get(stories::get_story)
                .put(stories::update_story)
                .delete(stories::delete_story),
        )
        .route(
            "/stories/:slug/reviews",
            get(social::list_reviews)
                .post(social::create_review)
                .delete(social::delete_review),
        )
        .route(
            "/stories/:slug/save",
            post(social::save_story).delete(social::unsave_story),
        )
        // Chapters
        .route(
            "/stories/:slug/chapters",
            get(chapters::list_chapters).post(chapters::create_chapter),
        )
        .route(
            "/stories/:slug/chapters/:number",
            get(chapters::get_chapter)
                .put(chapters::update_chapter)
                .delete(chapters::delete_chapter),
        )
        .route(
            "/stories/:slug/chapters/:number/like",
            post(chapters::like_chapter).delete(chapters::unlike_chapter),
        )
        .route(
            "/stories/:slug/chapters/:number/comments",
            get(social::list_comments).post(social::create_comment),
        )
        .route(
            "/comments/:id",
            put(social::update_comment).delete(social::delete_comment),
        )
        // Readers and authors
        .route("/reading-list", get(social::get_reading_list))
        .route("/users/:username", get(social::get_profile))
        .route(
            "/users/:username/follow",
            post(social::follow_user).delete(social::unfollow_user),
        )
        .route(
            "/progress",
            get(progress::list_progress).post(progress::update_progress),
        )
        .route("/progress/:slug", get(progress::get_story_progress))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route(
            "/notifications/settings",
            get(notifications::get_settings).put(notifications::update_settings),
        )
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/dashboard", get(dashboard::get_dashboard))
        // Discovery
        .route("/search", get(stories::search_stories))
        .route("/tags", get(api_handlers::list_tags))
        .route("/stats", get(api_handlers::get_stats))
        // Admin
        .route("/admin/publish-scheduled", post(admin::publish_scheduled))
        .route("/admin/scheduled", get(admin::list_scheduled))
        .route("/admin/reindex", post(admin::reindex))
        .layer(from_fn_with_state(state.publisher.clone(), auto_publish))
        .with_state(state)
}

/// Create the router with all endpoints
pub fn create_router(state: AppState, settings: &Settings) -> Router {
    let mut api_routes = api_router(state.clone());

    // NOTE: behind a reverse proxy every request shares the proxy's address;
    // swap in a header-based extractor there.
    let governor_conf = GovernorConfigBuilder::default()
        .key_extractor(FallbackIpKeyExtractor)
        .error_handler(governor_error)
        // One token every 1/rate seconds
        .per_millisecond((1000 / settings.server.api_rate_limit).max(1))
        .burst_size(settings.server.api_rate_limit as u32 * 2)
        .finish();
    match governor_conf {
        Some(config) => {
            api_routes = api_routes.layer(GovernorLayer {
                config: Arc::new(config),
            });
        }
        None => warn!("Invalid rate limit configuration, API rate limiting disabled"),
    }

    // Health check routes
    let health_routes = Router::new()
        .route("/health", get(api_handlers::health_check))
        .route("/ready", get(api_handlers::readiness_check))
        .with_state(state);

    // Main router with middleware
    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(
            // Request body size limit - chapters can be long, but not unbounded
            RequestBodyLimitLayer::new(settings.pagination.max_request_body_size),
        )
        .layer(CookieManagerLayer::new())
        .layer(
            CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
                .allow_origin(tower_http::cors::Any)
                .max_age(Duration::from_secs(3600)),
        )
        .layer(
            // Security headers
            SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        )
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ))
        .layer(
            // HSTS - enforce HTTPS (only if served over HTTPS)
            SetResponseHeaderLayer::if_not_present(
                header::STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static("max-age=31536000; includeSubDomains"),
            ),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
