use crate::db::{models::*, DbPool};
use crate::error::{Error, Result};
use chrono::Utc;

pub async fn create_notification(pool: &DbPool, new: &NewNotification) -> Result<Notification> {
    let notification = sqlx::query_as::<_, Notification>(
        r#"
        INSERT INTO notifications (user_id, kind, message, link, read, created_at)
        VALUES (?, ?, ?, ?, 0, ?)
        RETURNING *
        "#,
    )
    .bind(new.user_id)
    .bind(&new.kind)
    .bind(&new.message)
    .bind(&new.link)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(notification)
}

/// Notifications for a user, newest first
pub async fn list_notifications(
    pool: &DbPool,
    user_id: i64,
    unread_only: bool,
    limit: i64,
) -> Result<Vec<Notification>> {
    let query = if unread_only {
        "SELECT * FROM notifications WHERE user_id = ? AND read = 0 \
         ORDER BY created_at DESC, id DESC LIMIT ?"
    } else {
        "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?"
    };

    let notifications = sqlx::query_as::<_, Notification>(query)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(notifications)
}

pub async fn count_unread(pool: &DbPool, user_id: i64) -> Result<i64> {
    let count =
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = 0")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Mark one of the user's notifications as read
pub async fn mark_read(pool: &DbPool, user_id: i64, notification_id: i64) -> Result<()> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!(
            "Notification {notification_id} not found"
        )));
    }

    Ok(())
}

/// Mark all of the user's notifications as read; returns how many changed
pub async fn mark_all_read(pool: &DbPool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Settings for a user; all channels enabled when no row exists
pub async fn get_settings(pool: &DbPool, user_id: i64) -> Result<NotificationSettings> {
    let settings = sqlx::query_as::<_, NotificationSettings>(
        "SELECT user_id, new_chapters, comments, follows, reviews \
         FROM notification_settings WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(settings.unwrap_or_else(|| NotificationSettings::defaults_for(user_id)))
}

pub async fn upsert_settings(
    pool: &DbPool,
    settings: &NotificationSettings,
) -> Result<NotificationSettings> {
    sqlx::query(
        r#"
        INSERT INTO notification_settings (user_id, new_chapters, comments, follows, reviews, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id) DO UPDATE SET
            new_chapters = excluded.new_chapters,
            comments = excluded.comments,
            follows = excluded.follows,
            reviews = excluded.reviews,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(settings.user_id)
    .bind(settings.new_chapters)
    .bind(settings.comments)
    .bind(settings.follows)
    .bind(settings.reviews)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    get_settings(pool, settings.user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory_db, users};

    #[tokio::test]
    async fn test_settings_default_and_read_flags() {
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

        let settings = get_settings(&pool, user.id).await.unwrap();
        assert!(settings.new_chapters && settings.comments && settings.follows && settings.reviews);

        let updated = upsert_settings(
            &pool,
            &NotificationSettings {
                new_chapters: false,
                ..settings
            },
        )
        .await
        .unwrap();
        assert!(!updated.new_chapters);
        assert!(updated.comments);

        for i in 0..3 {
            create_notification(
                &pool,
                &NewNotification {
                    user_id: user.id,
                    kind: "new_follower".to_string(),
                    message: format!("follower {i}"),
                    link: None,
                },
            )
            .await
            .unwrap();
        }
        let all = list_notifications(&pool, user.id, false, 10).await.unwrap();
        assert_eq!(all.len(), 3);

        mark_read(&pool, user.id, all[0].id).await.unwrap();
        assert_eq!(count_unread(&pool, user.id).await.unwrap(), 2);
        assert!(matches!(
            mark_read(&pool, user.id + 1, all[1].id).await,
            Err(Error::NotFound(_))
        ));

        assert_eq!(mark_all_read(&pool, user.id).await.unwrap(), 2);
        assert!(list_notifications(&pool, user.id, true, 10)
            .await
            .unwrap()
            .is_empty());
    }
}
