//! `/display` routes for the public waiting-room screen. No authentication.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{AppError, AppResult},
    models::CallEvent,
    services::{appointments::today, call_history::DEFAULT_RECENT},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/display/recent-calls", get(recent_calls))
        .route("/display/today",        get(today_summary))
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct TodaySummary {
    date:     String,
    total:    i64,
    pending:  i64,
    attended: i64,
}

/// Lets a display that joins late show what was already announced.
async fn recent_calls(
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<RecentQuery>, AppError>,
) -> AppResult<Json<Vec<CallEvent>>> {
    let limit = q.limit.unwrap_or(DEFAULT_RECENT);
    Ok(Json(state.call_log().recent(limit).await?))
}

async fn today_summary(State(state): State<AppState>) -> AppResult<Json<TodaySummary>> {
    let date = today();
    let counts = state.appointments().counts_for_date(&date).await?;
    Ok(Json(TodaySummary {
        date,
        total:    counts.total,
        pending:  counts.pending,
        attended: counts.attended,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::test_support::{app, read_json, send, seeded_state};
    use crate::services::appointments::{tests::new_appointment, today};

    #[tokio::test]
    async fn today_counts_are_public() {
        let (state, _dir) = seeded_state().await;
        let doc = crate::routes::test_support::create_doctor(&state, "kstadler", "Karina Stadler", "C3").await;
        state.appointments().insert(&new_appointment(doc, "T001", &today(), "08:00")).await.unwrap();
        state.appointments().insert(&new_appointment(doc, "T002", "2000-01-01", "08:00")).await.unwrap();
        let app = app(state);

        let (status, body) = send(&app, "GET", "/api/v1/display/today", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let body = read_json(body).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["pending"], 1);
        assert_eq!(body["attended"], 0);

        let (status, body) = send(&app, "GET", "/api/v1/display/recent-calls", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(read_json(body).await.as_array().unwrap().is_empty());
    }
}
