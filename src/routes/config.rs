//! `/config` routes: reads are public (the display needs them), writes need
//! an admin token.

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;

use crate::{
    errors::{AppError, AppResult},
    middleware::{auth_guard::require_auth, role_guard::require_admin},
    services::settings::{AudioPatch, AudioSettings, SchedulePatch, ScheduleSettings, Settings, SettingsPatch},
    state::AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    let writes = Router::new()
        .route("/config/audio",    post(update_audio))
        .route("/config/schedule", post(update_schedule))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/config",          get(get_settings))
        .route("/config/audio",    get(get_audio))
        .route("/config/schedule", get(get_schedule))
        .merge(writes)
}

async fn get_settings(State(state): State<AppState>) -> AppResult<Json<Settings>> {
    Ok(Json(state.settings.get().await?))
}

async fn get_audio(State(state): State<AppState>) -> AppResult<Json<AudioSettings>> {
    Ok(Json(state.settings.get().await?.audio))
}

async fn get_schedule(State(state): State<AppState>) -> AppResult<Json<ScheduleSettings>> {
    Ok(Json(state.settings.get().await?.schedule))
}

async fn update_audio(
    State(state): State<AppState>,
    WithRejection(Json(patch), _): WithRejection<Json<AudioPatch>, AppError>,
) -> AppResult<Json<AudioSettings>> {
    Ok(Json(state.settings.update(SettingsPatch::Audio(patch)).await?.audio))
}

async fn update_schedule(
    State(state): State<AppState>,
    WithRejection(Json(patch), _): WithRejection<Json<SchedulePatch>, AppError>,
) -> AppResult<Json<ScheduleSettings>> {
    Ok(Json(state.settings.update(SettingsPatch::Schedule(patch)).await?.schedule))
}
