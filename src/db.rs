use std::str::FromStr;
use std::time::Duration;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use crate::config::Config;

pub type Db = SqlitePool;

pub async fn connect(config: &Config) -> anyhow::Result<Db> {
    ensure_parent_dir(&config.database_url)?;

    // Writers wait on each other for up to `busy_timeout` instead of failing.
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    tracing::info!("Database connection pool established");
    Ok(pool)
}

/// Run all SQLx migrations from the `migrations/` directory embedded at compile time.
pub async fn run_migrations(pool: &Db) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// SQLite will not create missing directories for a file database.
fn ensure_parent_dir(url: &str) -> anyhow::Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Fresh migrated database in a temporary directory.
#[cfg(test)]
pub async fn test_pool() -> (Db, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let config = Config::for_tests(dir.path());
    let pool = connect(&config).await.expect("connect test db");
    run_migrations(&pool).await.expect("migrate test db");
    (pool, dir)
}
