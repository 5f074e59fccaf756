pub mod seed;
pub mod token;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::db::Db;
use crate::errors::{AppError, AppResult};
use crate::models::{User, UserRole};
use token::TokenIssuer;

// ── Password helpers ──────────────────────────────────────────

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt    = SaltString::generate(&mut OsRng);
    let argon2  = Argon2::default();
    let hash    = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Argon2 verification compares digests in constant time.
pub fn verify_password(password: &str, hash: &str) -> AppResult<()> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid hash: {e}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::Unauthorized)
}

/// Verified against when the username is unknown so both paths cost one hash.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash_password("not-a-real-password").ok());

// ── Password validation ───────────────────────────────────────

// Only enforced outside development (see routes/doctors.rs).
pub fn validate_password_strength(password: &str) -> AppResult<()> {
    if password.len() < 8 {
        return Err(AppError::BadRequest("Password must be at least 8 characters".into()));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(
            "Password must contain at least one number".into(),
        ));
    }
    Ok(())
}

// ── Login ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id:        i64,
    pub username:  String,
    pub full_name: String,
    pub role:      UserRole,
    pub room:      Option<String>,
    pub specialty: Option<String>,
}

impl From<&User> for Profile {
    fn from(u: &User) -> Self {
        Self {
            id:        u.id,
            username:  u.username.clone(),
            full_name: u.full_name.clone(),
            role:      u.role,
            room:      u.room.clone(),
            specialty: u.specialty.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token:   String,
    pub profile: Profile,
}

/// Check credentials of an active account and issue a signed token.
pub async fn authenticate(
    pool: &Db,
    tokens: &TokenIssuer,
    username: &str,
    password: &str,
) -> AppResult<LoginOutcome> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, full_name, role, room, specialty, is_active
         FROM users WHERE username = ? AND is_active = 1 LIMIT 1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    let Some(user) = user else {
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            let _ = verify_password(password, dummy);
        }
        tracing::info!(username, "Login rejected: unknown or inactive user");
        return Err(AppError::Unauthorized);
    };

    if let Err(err) = verify_password(password, &user.password_hash) {
        tracing::info!(username, "Login rejected: wrong password");
        return Err(err);
    }

    let token = tokens.issue(&user)?;
    Ok(LoginOutcome { token, profile: Profile::from(&user) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn insert_user(pool: &Db, username: &str, password: &str, role: UserRole, active: bool) -> i64 {
        sqlx::query(
            "INSERT INTO users (username, password_hash, full_name, role, room, is_active)
             VALUES (?, ?, ?, ?, 'Consultorio 1', ?)",
        )
        .bind(username)
        .bind(hash_password(password).unwrap())
        .bind(format!("{username} full"))
        .bind(role)
        .bind(active)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash).is_ok());
        assert!(matches!(verify_password("wrong", &hash), Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn token_role_matches_stored_role() {
        let (pool, _dir) = test_pool().await;
        let tokens = TokenIssuer::new("secret", 8);
        for (name, role) in [("ana", UserRole::Doctor), ("root", UserRole::System), ("boss", UserRole::Admin)] {
            insert_user(&pool, name, "pw12345678", role, true).await;
            let outcome = authenticate(&pool, &tokens, name, "pw12345678").await.unwrap();
            assert_eq!(tokens.verify(&outcome.token).unwrap().role, role);
            assert_eq!(outcome.profile.role, role);
        }
    }

    #[tokio::test]
    async fn wrong_password_and_inactive_are_unauthorized() {
        let (pool, _dir) = test_pool().await;
        let tokens = TokenIssuer::new("secret", 8);
        insert_user(&pool, "ana", "right", UserRole::Doctor, true).await;
        insert_user(&pool, "old", "right", UserRole::Doctor, false).await;

        assert!(matches!(
            authenticate(&pool, &tokens, "ana", "wrong").await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            authenticate(&pool, &tokens, "old", "right").await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            authenticate(&pool, &tokens, "nobody", "right").await,
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn password_strength() {
        assert!(validate_password_strength("short1").is_err());
        assert!(validate_password_strength("longenough").is_err());
        assert!(validate_password_strength("longenough1").is_ok());
    }
}
