use crate::db::{models::*, DbPool};
use crate::error::{Error, Result};
use chrono::Utc;

/// Create a new user
pub async fn create_user(pool: &DbPool, new_user: &NewUser) -> Result<User> {
    let now = Utc::now();

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, password_hash, display_name, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'user', ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(&new_user.password_hash)
    .bind(&new_user.display_name)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| Error::from(e).conflict_on_unique("Username or email already taken"))?;

    Ok(user)
}

/// Get user by ID
pub async fn get_user(pool: &DbPool, user_id: i64) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {user_id} not found")))
}

/// Get user by username
pub async fn get_user_by_username(pool: &DbPool, username: &str) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ? COLLATE NOCASE")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User '{username}' not found")))
}

/// Find a user by username or email (login identifier)
pub async fn find_by_login(pool: &DbPool, login: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE username = ? COLLATE NOCASE OR email = ? COLLATE NOCASE",
    )
    .bind(login)
    .bind(login)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Update profile fields
pub async fn update_profile(
    pool: &DbPool,
    user_id: i64,
    display_name: Option<&str>,
    bio: Option<&str>,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET display_name = ?, bio = ?, updated_at = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(display_name)
    .bind(bio)
    .bind(Utc::now())
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("User {user_id} not found")))?;

    Ok(user)
}

/// Change a user's role
pub async fn set_role(pool: &DbPool, username: &str, role: Role) -> Result<()> {
    let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE username = ?")
        .bind(role)
        .bind(Utc::now())
        .bind(username)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("User '{username}' not found")));
    }

    Ok(())
}

/// Count users
pub async fn count_users(pool: &DbPool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
