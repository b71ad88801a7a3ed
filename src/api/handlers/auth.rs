use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use tower_cookies::Cookies;
use tracing::{debug, info};

use super::AppState;
use crate::api::extract::Json;
use crate::api::models::*;
use crate::auth::{password, session, AuthUser};
use crate::db::{
    self,
    models::{NewUser, User},
};
use crate::utils::validation::{self, MAX_BIO_LEN, MAX_TITLE_LEN};
use crate::{Error, Result};

/// Open a session for `user`, set the cookie, and build the response body
async fn start_session(state: &AppState, cookies: &Cookies, user: User) -> Result<AuthResponse> {
    let (token, token_hash) = session::generate_token();
    let expires_at = session::expires_at(&state.settings.auth, Utc::now());
    db::sessions::create_session(&state.pool, user.id, &token_hash, expires_at).await?;

    cookies.add(session::session_cookie(token.clone(), &state.settings.auth));

    Ok(AuthResponse {
        token,
        expires_at,
        user,
    })
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let username = req.username.trim();
    let email = req.email.trim();
    validation::validate_username(username)?;
    validation::validate_email(email)?;
    password::validate_password_strength(&req.password, state.settings.auth.min_password_length)?;
    let display_name =
        validation::optional_text("display_name", req.display_name.as_deref(), MAX_TITLE_LEN)?;

    let password_hash = password::hash_password(&req.password)?;
    let user = db::users::create_user(
        &state.pool,
        &NewUser {
            username: username.to_string(),
            email: email.to_lowercase(),
            password_hash,
            display_name,
        },
    )
    .await?;

    info!("Registered user {}", user.username);

    let response = start_session(&state, &cookies, user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let invalid = || Error::Unauthorized("Invalid username or password".to_string());

    let user = db::users::find_by_login(&state.pool, req.login.trim())
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        return Err(invalid());
    }

    let removed = db::sessions::delete_expired_sessions(&state.pool, Utc::now()).await?;
    if removed > 0 {
        debug!("Removed {} expired sessions", removed);
    }

    debug!("User {} logged in", user.username);
    Ok(Json(start_session(&state, &cookies, user).await?))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    auth: AuthUser,
) -> Result<StatusCode> {
    db::sessions::delete_session(&state.pool, &auth.token_hash).await?;
    cookies.remove(session::removal_cookie());
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

/// PUT /api/auth/me
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>> {
    // Absent fields keep their current value
    let display_name = match req.display_name {
        Some(name) => validation::optional_text("display_name", Some(&name), MAX_TITLE_LEN)?,
        None => auth.user.display_name.clone(),
    };
    let bio = match req.bio {
        Some(bio) => validation::optional_text("bio", Some(&bio), MAX_BIO_LEN)?,
        None => auth.user.bio.clone(),
    };

    let user = db::users::update_profile(
        &state.pool,
        auth.id(),
        display_name.as_deref(),
        bio.as_deref(),
    )
    .await?;

    Ok(Json(user))
}
