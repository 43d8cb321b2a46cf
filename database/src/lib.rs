pub mod notification;
pub mod subscription;

use sqlx::SqlitePool;

/// Runs the embedded migrations. Safe to call on every startup.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}
