use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// One browser's push registration. The endpoint URL is the identity:
/// the table holds at most one row per endpoint, and rows are never
/// deleted, only flipped inactive.
#[derive(Clone, Debug, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: i64,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub user_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Registers an endpoint, or refreshes it if it is already on file.
    ///
    /// A browser that re-subscribes posts the same endpoint with new keys;
    /// the row keeps its `created_at` and owner, gets the new keys, and is
    /// reactivated if a previous delivery had retired it.
    pub async fn upsert_by_endpoint(
        pool: &SqlitePool,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
        user_id: Option<&str>,
    ) -> sqlx::Result<Self> {
        let now = Utc::now();

        sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (endpoint, p256dh, auth, user_id, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $5)
            ON CONFLICT (endpoint) DO UPDATE SET
                p256dh = excluded.p256dh,
                auth = excluded.auth,
                user_id = COALESCE(excluded.user_id, subscriptions.user_id),
                active = TRUE,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(endpoint)
        .bind(p256dh)
        .bind(auth)
        .bind(user_id)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_active_by_endpoint(
        pool: &SqlitePool,
        endpoint: &str,
    ) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE endpoint = $1 AND active = TRUE",
        )
        .bind(endpoint)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_active(pool: &SqlitePool) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE active = TRUE ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(pool)
        .await
    }

    /// Soft-deletes by endpoint. Returns `false` when no such row exists.
    pub async fn deactivate(pool: &SqlitePool, endpoint: &str) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions SET active = FALSE, updated_at = $2 WHERE endpoint = $1",
        )
        .bind(endpoint)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
