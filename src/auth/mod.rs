//! Password and session authentication with axum extractors.
//!
//! Requests authenticate with `Authorization: Bearer <token>` or the
//! `session` cookie. Only the SHA-256 hash of a token is stored.

pub mod password;
pub mod session;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;
use tower_cookies::Cookies;

use crate::api::handlers::AppState;
use crate::db::{
    self,
    models::{Role, User},
};
use crate::error::Error;

/// An authenticated user resolved from a live session
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token_hash: String,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }
}

/// Token from the Authorization header, falling back to the session cookie
fn request_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    bearer.or_else(|| {
        parts
            .extensions
            .get::<Cookies>()
            .and_then(|cookies| cookies.get(session::SESSION_COOKIE))
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    })
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = request_token(parts)
            .ok_or_else(|| Error::Unauthorized("Authentication required".to_string()))?;

        let token_hash = session::hash_token(&token);
        let user = db::sessions::find_user_by_token_hash(&state.pool, &token_hash, Utc::now())
            .await?
            .ok_or_else(|| Error::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(AuthUser { user, token_hash })
    }
}

/// Requires the `admin` role; 403 otherwise
pub struct RequireAdmin(pub AuthUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(Error::Forbidden("Admin role required".to_string()));
        }
        Ok(RequireAdmin(user))
    }
}
