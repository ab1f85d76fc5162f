use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("connect to database")
}

/// Applies embedded migrations; a failure is logged and startup continues.
pub async fn run_migrations(db: &PgPool) {
    if let Err(e) = sqlx::migrate!("./migrations").run(db).await {
        tracing::warn!(error = %e, "migration failed; continuing");
    }
}

/// Pool for store tests against a real Postgres, migrated to the latest
/// schema. Returns `None` with a skip marker when `TEST_DATABASE_URL` is unset;
/// a configured but unreachable database fails the test.
#[cfg(test)]
pub(crate) async fn test_pool() -> Option<PgPool> {
    let Some(url) = std::env::var("TEST_DATABASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
    else {
        eprintln!("SKIP-TEST-DATABASE: TEST_DATABASE_URL is not set");
        return None;
    };
    let pool = connect(&url, 4)
        .await
        .expect("connect to TEST_DATABASE_URL");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("apply migrations to the test database");
    Some(pool)
}
