use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde_json::json;

use crate::{
    errors::{AppError, AppResult},
    services::tts::SpeechRequest,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/tts/generate", post(generate))
}

/// 200 with `{url, filename}`, or 503 with `fallback: true` so the browser
/// speaks the announcement itself.
async fn generate(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<SpeechRequest>, AppError>,
) -> AppResult<Response> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("text is required".into()));
    }

    match state.tts.synthesize(&req).await {
        Some(audio) => Ok(Json(audio).into_response()),
        None => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Speech synthesis unavailable", "fallback": true })),
        )
            .into_response()),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{app, read_json, send, seeded_state};

    #[tokio::test]
    async fn without_key_client_falls_back() {
        let (state, _dir) = seeded_state().await;
        let app = app(state);

        let (status, body) = send(&app, "POST", "/api/v1/tts/generate", None, Some(json!({ "text": "T001 Consultorio 3" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(read_json(body).await["fallback"], true);

        let (status, _) = send(&app, "POST", "/api/v1/tts/generate", None, Some(json!({ "text": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
