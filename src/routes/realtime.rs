//! `/realtime/ws`: live call announcements over WebSocket.
//!
//! `?group=display` is public. `?group=doctor&token=<jwt>` subscribes to the
//! calls made by that doctor. Frames are `{"event":"call","data":{...}}`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use axum_extra::extract::WithRejection;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::{error::RecvError, Receiver};

use crate::{
    errors::{AppError, AppResult},
    middleware::{auth_guard::AuthUser, role_guard::authorize},
    models::{CallNotification, UserRole},
    services::notifier::Audience,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/realtime/ws", get(subscribe))
}

#[derive(Debug, Default, Deserialize)]
struct SubscribeQuery {
    group: Option<String>,
    token: Option<String>,
}

fn resolve_audience(state: &AppState, q: &SubscribeQuery) -> AppResult<Audience> {
    match q.group.as_deref().unwrap_or("display") {
        "display" => Ok(Audience::Display),
        "doctor" => {
            let token = q.token.as_deref().ok_or(AppError::Unauthorized)?;
            let user = AuthUser::from(state.tokens.verify(token)?);
            authorize(&user, &[UserRole::Doctor])?;
            Ok(Audience::Doctor(user.user_id))
        }
        other => Err(AppError::BadRequest(format!("Unknown group '{other}'"))),
    }
}

async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<SubscribeQuery>, AppError>,
) -> AppResult<Response> {
    let audience = resolve_audience(&state, &q)?;
    let rx = state.calls.subscribe(audience);
    tracing::debug!(?audience, displays = state.calls.display_subscribers(), "Realtime subscriber joined");
    Ok(ws.on_upgrade(move |socket| forward_calls(socket, rx, audience)))
}

fn call_frame(call: &CallNotification) -> String {
    json!({ "event": "call", "data": call }).to_string()
}

async fn forward_calls(socket: WebSocket, mut rx: Receiver<CallNotification>, audience: Audience) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(call) => {
                    if sink.send(Message::Text(call_frame(&call).into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(?audience, skipped, "Realtime subscriber lagging; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sink.close().await;
    tracing::debug!(?audience, "Realtime subscriber left");
}
