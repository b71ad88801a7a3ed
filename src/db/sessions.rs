use crate::db::{models::*, DbPool};
use crate::error::Result;
use chrono::{DateTime, Utc};

/// Store a session by the hash of its token
pub async fn create_session(
    pool: &DbPool,
    user_id: i64,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<Session> {
    let session = sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO sessions (user_id, token_hash, expires_at, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(session)
}

/// Resolve a live session to its user
pub async fn find_user_by_token_hash(
    pool: &DbPool,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT u.*
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = ? AND s.expires_at > ?
        "#,
    )
    .bind(token_hash)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Delete a session
pub async fn delete_session(pool: &DbPool, token_hash: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;

    Ok(())
}

/// Remove sessions past their expiry
pub async fn delete_expired_sessions(pool: &DbPool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_db, users};
    use chrono::Duration;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let pool = init_memory_db().await.unwrap();
        let user = users::create_user(
            &pool,
            &NewUser {
                username: "reader".to_string(),
                email: "reader@example.com".to_string(),
                password_hash: "hash".to_string(),
                display_name: None,
            },
        )
        .await
        .unwrap();

        let now = Utc::now();
        create_session(&pool, user.id, "live", now + Duration::hours(1))
            .await
            .unwrap();
        create_session(&pool, user.id, "stale", now - Duration::hours(1))
            .await
            .unwrap();

        let found = find_user_by_token_hash(&pool, "live", now).await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(find_user_by_token_hash(&pool, "stale", now)
            .await
            .unwrap()
            .is_none());

        assert_eq!(delete_expired_sessions(&pool, now).await.unwrap(), 1);

        delete_session(&pool, "live").await.unwrap();
        assert!(find_user_by_token_hash(&pool, "live", now)
            .await
            .unwrap()
            .is_none());
    }
}
