//! Database migrations, embedded from `sporta_core/migrations/`.

use sqlx::PgPool;

/// Bring the schema up to date. Already-applied migrations are skipped.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
