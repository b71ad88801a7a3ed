use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tower_cookies::cookie::SameSite;
use tower_cookies::Cookie;
use uuid::Uuid;

use crate::config::AuthConfig;

pub const SESSION_COOKIE: &str = "session";

/// Generate an opaque session token; returns `(plaintext, sha256_hex)`
pub fn generate_token() -> (String, String) {
    let plaintext = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let hash = hash_token(&plaintext);
    (plaintext, hash)
}

/// SHA-256 hex digest of a session token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn expires_at(config: &AuthConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(config.session_ttl_hours)
}

/// HttpOnly cookie carrying the session token
pub fn session_cookie(token: String, config: &AuthConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(tower_cookies::cookie::time::Duration::hours(
            config.session_ttl_hours,
        ))
        .build()
}

/// Cookie matching the session cookie's path, passed to `Cookies::remove` on logout
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_hash_is_stable() {
        let (token, hash) = generate_token();
        assert_eq!(token.len(), 64);
        assert_eq!(hash, hash_token(&token));
        assert_eq!(hash.len(), 64);
        assert_ne!(generate_token().0, token);
    }

    #[test]
    fn test_session_cookie_flags() {
        let config = AuthConfig {
            session_ttl_hours: 24,
            cookie_secure: true,
            min_password_length: 8,
        };
        let cookie = session_cookie("abc".to_string(), &config);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
    }
}
