use axum::{middleware, Router};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    middleware::auth_guard::require_auth,
    state::AppState,
};

mod admin;
mod appointments;
mod auth;
mod config;
mod display;
mod doctors;
mod realtime;
mod tts;

/// Build the full `/api/v1` router.
///
/// Login, display, settings reads, speech synthesis and the realtime socket
/// are public; every other route is wrapped in the bearer-token
/// [`require_auth`] middleware, with role guards applied per module.
pub fn all_routes(state: AppState) -> Router<AppState> {
    let auth_mw = middleware::from_fn_with_state(state.clone(), require_auth);
    Router::new()
        .merge(auth::public_router())
        .merge(config::router(state))
        .merge(display::router())
        .merge(tts::router())
        .merge(realtime::router())
        .merge(
            Router::new()
                .merge(auth::router())
                .merge(appointments::router())
                .merge(doctors::router())
                .merge(admin::router())
                .route_layer(auth_mw),
        )
}

/// The complete application: API, generated audio and HTTP layers.
pub fn app(state: AppState) -> Router {
    let audio_dir = state.config.audio_dir.clone();
    Router::new()
        .nest("/api/v1", all_routes(state.clone()))
        .nest_service("/audio", ServeDir::new(audio_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::auth::seed::seed_accounts;
    use crate::services::doctors::NewDoctor;
    use crate::state::{test_state, AppState};

    pub use super::app;

    /// Test state with the `admin` / `sistema` accounts seeded.
    pub async fn seeded_state() -> (AppState, tempfile::TempDir) {
        let (state, dir) = test_state().await;
        seed_accounts(&state.pool, &state.config).await.unwrap();
        (state, dir)
    }

    /// Create a doctor whose password is `clinica2024`; returns its id.
    pub async fn create_doctor(state: &AppState, username: &str, full_name: &str, room: &str) -> i64 {
        state
            .doctors()
            .create(&NewDoctor {
                username:  username.into(),
                password:  "clinica2024".into(),
                full_name: full_name.into(),
                room:      room.into(),
                specialty: None,
            })
            .await
            .unwrap()
            .id
    }

    pub fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        authorization: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Body) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(auth) = authorization {
            req = req.header(header::AUTHORIZATION, auth);
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        (resp.status(), resp.into_body())
    }

    /// One-field `multipart/form-data` upload.
    pub async fn send_file(
        app: &Router,
        uri: &str,
        authorization: &str,
        field: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> (StatusCode, Body) {
        const BOUNDARY: &str = "turnera-test-boundary";
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, authorization)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        (resp.status(), resp.into_body())
    }

    pub async fn read_json(body: Body) -> Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Log in through the API and return the `Authorization` header value.
    pub async fn login(app: &Router, username: &str, password: &str) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(serde_json::json!({ "username": username, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "login as {username}");
        let token = read_json(body).await["token"].as_str().unwrap().to_owned();
        bearer(&token)
    }
}
