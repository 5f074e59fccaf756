use axum::{
    extract::{Extension, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    auth::{authenticate, Profile},
    errors::{AppError, AppResult},
    middleware::auth_guard::AuthUser,
    state::AppState,
};

/// `POST /auth/login` (public).
pub fn public_router() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

/// `GET /auth/verify` (behind `require_auth`).
pub fn router() -> Router<AppState> {
    Router::new().route("/auth/verify", get(verify))
}

// ── Request / response types ──────────────────────────────────

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user:  Profile,
}

// ── Handlers ──────────────────────────────────────────────────

async fn login(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<LoginRequest>, AppError>,
) -> AppResult<Json<LoginResponse>> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(AppError::BadRequest("Username and password are required".into()));
    }

    let outcome = authenticate(&state.pool, &state.tokens, username, &body.password).await?;
    tracing::info!(user_id = outcome.profile.id, role = %outcome.profile.role, "Login succeeded");

    Ok(Json(LoginResponse {
        token: outcome.token,
        user:  outcome.profile,
    }))
}

async fn verify(Extension(user): Extension<AuthUser>) -> Json<Value> {
    Json(json!({ "valid": true, "user": user }))
}
