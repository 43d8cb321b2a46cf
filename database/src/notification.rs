use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// One dispatch request. Rows are append-only history: `sent` flips to
/// true exactly once, after every delivery for the dispatch has been
/// attempted, and the row never changes again.
#[derive(Clone, Debug, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub data: Option<String>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The caller-supplied content of a notification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewNotification {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl Notification {
    pub async fn create(pool: &SqlitePool, new: &NewNotification) -> sqlx::Result<Self> {
        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (title, body, icon, badge, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(&new.body)
        .bind(&new.icon)
        .bind(&new.badge)
        .bind(&new.data)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn mark_sent(
        pool: &SqlitePool,
        id: i64,
        sent_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query("UPDATE notifications SET sent = TRUE, sent_at = $2 WHERE id = $1")
            .bind(id)
            .bind(sent_at)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Full dispatch history, newest first.
    pub async fn list(pool: &SqlitePool) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::migrate(&pool).await.unwrap();
        pool
    }

    fn new_notification(title: &str) -> NewNotification {
        NewNotification {
            title: title.into(),
            body: "body".into(),
            icon: None,
            badge: None,
            data: None,
        }
    }

    #[tokio::test]
    async fn created_notifications_start_unsent() {
        let pool = test_pool().await;

        let notification = Notification::create(&pool, &new_notification("Hi"))
            .await
            .unwrap();
        assert!(!notification.sent);
        assert!(notification.sent_at.is_none());
    }

    #[tokio::test]
    async fn mark_sent_sets_flag_and_timestamp() {
        let pool = test_pool().await;

        let notification = Notification::create(&pool, &new_notification("Hi"))
            .await
            .unwrap();
        let sent_at = Utc::now();
        Notification::mark_sent(&pool, notification.id, sent_at)
            .await
            .unwrap();

        let listed = Notification::list(&pool).await.unwrap();
        assert!(listed[0].sent);
        assert_eq!(listed[0].sent_at, Some(sent_at));
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let pool = test_pool().await;

        let first = Notification::create(&pool, &new_notification("first"))
            .await
            .unwrap();
        let second = Notification::create(&pool, &new_notification("second"))
            .await
            .unwrap();

        let listed = Notification::list(&pool).await.unwrap();
        assert_eq!(
            listed.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
    }
}
