//! Role-based authorization.
//!
//! The `system` role is a superuser carve-out: it is checked before any
//! per-route allowlist and passes every role check.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};

use crate::errors::{AppError, AppResult};
use crate::middleware::auth_guard::AuthUser;
use crate::models::UserRole;

pub fn is_superuser(user: &AuthUser) -> bool {
    user.role == UserRole::System
}

/// Allow `user` when it is a superuser or its role is in `allowed`.
pub fn authorize<'a>(user: &'a AuthUser, allowed: &[UserRole]) -> AppResult<&'a AuthUser> {
    if is_superuser(user) || allowed.contains(&user.role) {
        Ok(user)
    } else {
        Err(AppError::Forbidden)
    }
}

/// Middleware: require the `admin` role.
pub async fn require_admin(
    Extension(user): Extension<AuthUser>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&user, &[UserRole::Admin])?;
    Ok(next.run(req).await)
}

/// Middleware: require the `doctor` role.
pub async fn require_doctor(
    Extension(user): Extension<AuthUser>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&user, &[UserRole::Doctor])?;
    Ok(next.run(req).await)
}

/// Middleware: only the superuser.
pub async fn require_system(
    Extension(user): Extension<AuthUser>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&user, &[])?;
    Ok(next.run(req).await)
}
