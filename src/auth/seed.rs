use crate::auth::hash_password;
use crate::config::Config;
use crate::db::Db;
use crate::models::UserRole;

/// Seeds the `admin` and `sistema` accounts.
/// Runs on every startup; existing accounts are left untouched.
pub async fn seed_accounts(pool: &Db, config: &Config) -> anyhow::Result<()> {
    seed_account(pool, "admin", "Administrador", UserRole::Admin, &config.admin_password).await?;
    seed_account(pool, "sistema", "Administrador de Sistemas", UserRole::System, &config.system_password).await?;

    if config.is_development() {
        tracing::warn!("Development mode: seeded accounts use the configured or default passwords");
    }
    Ok(())
}

async fn seed_account(
    pool: &Db,
    username: &str,
    full_name: &str,
    role: UserRole,
    password: &str,
) -> anyhow::Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
        .bind(username)
        .fetch_one(pool)
        .await?;
    if exists {
        return Ok(());
    }

    let hash = hash_password(password)?;
    sqlx::query(
        "INSERT INTO users (username, password_hash, full_name, role, is_active)
         VALUES (?, ?, ?, ?, 1)",
    )
    .bind(username)
    .bind(hash)
    .bind(full_name)
    .bind(role)
    .execute(pool)
    .await?;
    tracing::info!(username, role = %role, "Seeded account");

    Ok(())
}
