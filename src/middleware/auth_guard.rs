//! Authentication guard middleware.
//!
//! Reads the `Authorization: Bearer <token>` header, verifies the token and
//! injects an `AuthUser` extension into the request for downstream handlers.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use serde::Serialize;

use crate::{
    auth::token::Claims,
    errors::AppError,
    models::UserRole,
    state::AppState,
};

/// Authenticated caller, taken from verified token claims. Downstream
/// handlers use `Extension<AuthUser>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub user_id:   i64,
    pub username:  String,
    pub role:      UserRole,
    pub full_name: String,
    pub room:      Option<String>,
}

impl From<Claims> for AuthUser {
    fn from(c: Claims) -> Self {
        Self {
            user_id:   c.id,
            username:  c.username,
            role:      c.role,
            full_name: c.full_name,
            room:      c.room,
        }
    }
}

/// Extract the raw token from a `Bearer` authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let (scheme, token) = value.split_once(' ').ok_or(AppError::Unauthorized)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AppError::Unauthorized);
    }
    Ok(token.trim())
}

/// Middleware: require a valid bearer token.
/// On success, inserts `AuthUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())?;
    let claims = state.tokens.verify(token)?;

    req.extensions_mut().insert(AuthUser::from(claims));

    Ok(next.run(req).await)
}
