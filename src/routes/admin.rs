//! `/admin` routes: account overview, counters, activity statistics, a full
//! JSON export and database maintenance. Reserved to the system account
//! (`require_system`).

use axum::{
    extract::{Query, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    errors::{AppError, AppResult},
    middleware::role_guard::require_system,
    models::{Appointment, CallEvent, User},
    services::appointments::{blank_as_none, AppointmentFilter},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/users",    get(list_users))
        .route("/admin/stats",    get(stats))
        .route("/admin/activity", get(activity))
        .route("/admin/export",   get(export))
        .route("/admin/purge",    post(purge))
        .route("/admin/optimize", post(optimize))
        .route_layer(middleware::from_fn(require_system))
}

// ── Response types ───────────────────────────────────────────

#[derive(Serialize, sqlx::FromRow)]
struct Stats {
    users:        i64,
    doctors:      i64,
    appointments: i64,
    calls:        i64,
}

#[derive(Debug, Default, Deserialize)]
struct ActivityQuery {
    /// Calendar month, `1..=12`, across all years.
    #[serde(default, deserialize_with = "blank_as_none")]
    month:     Option<u32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    specialty: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    doctor_id: Option<i64>,
}

#[derive(Serialize, sqlx::FromRow)]
struct ActivityTotals {
    active_doctors: i64,
    total:          i64,
    pending:        i64,
    attended:       i64,
    absent:         i64,
    calls:          i64,
}

#[derive(Serialize, sqlx::FromRow)]
struct SpecialtyActivity {
    name:     String,
    total:    i64,
    pending:  i64,
    attended: i64,
    absent:   i64,
}

#[derive(Serialize)]
struct Activity {
    #[serde(flatten)]
    totals:      ActivityTotals,
    specialties: Vec<SpecialtyActivity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PurgeBody {
    confirm: bool,
}

#[derive(Serialize)]
struct Export {
    exported_at:  chrono::DateTime<Utc>,
    users:        Vec<User>,
    appointments: Vec<Appointment>,
    call_history: Vec<CallEvent>,
}

// ── Handlers ─────────────────────────────────────────────────

async fn all_users(state: &AppState) -> AppResult<Vec<User>> {
    Ok(sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, full_name, role, room, specialty, is_active
         FROM users ORDER BY id",
    )
    .fetch_all(&state.pool)
    .await?)
}

/// `password_hash` is never serialized.
async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(all_users(&state).await?))
}

async fn stats(State(state): State<AppState>) -> AppResult<Json<Stats>> {
    let stats = sqlx::query_as::<_, Stats>(
        "SELECT
            (SELECT COUNT(*) FROM users)                        AS users,
            (SELECT COUNT(*) FROM users WHERE role = 'doctor')  AS doctors,
            (SELECT COUNT(*) FROM appointments)                 AS appointments,
            (SELECT COUNT(*) FROM call_history)                 AS calls",
    )
    .fetch_one(&state.pool)
    .await?;
    Ok(Json(stats))
}

const STATUS_SUMS: &str = "
    COALESCE(SUM(CASE WHEN a.status = 'pending'  THEN 1 ELSE 0 END), 0) AS pending,
    COALESCE(SUM(CASE WHEN a.status = 'attended' THEN 1 ELSE 0 END), 0) AS attended,
    COALESCE(SUM(CASE WHEN a.status = 'absent'   THEN 1 ELSE 0 END), 0) AS absent";

/// `month` as stored by `strftime('%m', …)`.
fn month_key(month: u32) -> String {
    format!("{month:02}")
}

fn push_activity_filters(qb: &mut QueryBuilder<'_, Sqlite>, q: &ActivityQuery) {
    qb.push(" WHERE 1 = 1");
    if let Some(month) = q.month {
        qb.push(" AND strftime('%m', a.date) = ").push_bind(month_key(month));
    }
    if let Some(ref specialty) = q.specialty {
        qb.push(" AND u.specialty = ").push_bind(specialty.clone());
    }
    if let Some(doctor_id) = q.doctor_id {
        qb.push(" AND a.doctor_id = ").push_bind(doctor_id);
    }
}

/// Appointment counts by status plus a per-specialty breakdown. Filters are
/// AND-combined; `calls` only follows the month filter.
async fn activity(
    State(state): State<AppState>,
    WithRejection(Query(q), _): WithRejection<Query<ActivityQuery>, AppError>,
) -> AppResult<Json<Activity>> {
    if let Some(month) = q.month {
        if !(1..=12).contains(&month) {
            return Err(AppError::BadRequest("month must be between 1 and 12".into()));
        }
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT (SELECT COUNT(*) FROM users WHERE role = 'doctor' AND is_active = 1) AS active_doctors,
                (SELECT COUNT(*) FROM call_history",
    );
    if let Some(month) = q.month {
        qb.push(" WHERE strftime('%m', called_at) = ").push_bind(month_key(month));
    }
    qb.push(") AS calls, COUNT(a.id) AS total,");
    qb.push(STATUS_SUMS);
    qb.push(" FROM appointments a LEFT JOIN users u ON u.id = a.doctor_id");
    push_activity_filters(&mut qb, &q);
    let totals = qb
        .build_query_as::<ActivityTotals>()
        .fetch_one(&state.pool)
        .await?;

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT u.specialty AS name, COUNT(a.id) AS total,");
    qb.push(STATUS_SUMS);
    qb.push(" FROM appointments a LEFT JOIN users u ON u.id = a.doctor_id");
    push_activity_filters(&mut qb, &q);
    qb.push(" AND u.specialty IS NOT NULL GROUP BY u.specialty ORDER BY total DESC, name ASC");
    let specialties = qb
        .build_query_as::<SpecialtyActivity>()
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(Activity { totals, specialties }))
}

async fn export(State(state): State<AppState>) -> AppResult<Json<Export>> {
    let users = all_users(&state).await?;
    let appointments = state
        .appointments()
        .list(&AppointmentFilter::default())
        .await?
        .into_iter()
        .map(|row| row.appointment)
        .collect();
    let call_history = sqlx::query_as::<_, CallEvent>(
        "SELECT id, appointment_id, doctor_id, ticket_number, patient_name, room, called_at
         FROM call_history ORDER BY id",
    )
    .fetch_all(&state.pool)
    .await?;

    tracing::info!(users = users.len(), calls = call_history.len(), "Data export generated");
    Ok(Json(Export {
        exported_at: Utc::now(),
        users,
        appointments,
        call_history,
    }))
}

/// Bulk purge: all call history, all appointments and every doctor account.
/// Admin and system accounts are kept. Requires `{"confirm": true}`.
async fn purge(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<PurgeBody>, AppError>,
) -> AppResult<Json<Value>> {
    if !body.confirm {
        return Err(AppError::BadRequest("Confirmation required".into()));
    }

    let mut tx = state.pool.begin().await?;
    let calls = sqlx::query("DELETE FROM call_history")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let appointments = sqlx::query("DELETE FROM appointments")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let doctors = sqlx::query("DELETE FROM users WHERE role NOT IN ('admin', 'system')")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    tracing::warn!(calls, appointments, doctors, "Database purged");
    Ok(Json(json!({
        "message": "Database purged; admin and system accounts kept",
        "deleted": { "call_history": calls, "appointments": appointments, "doctors": doctors },
    })))
}

/// `VACUUM` then `ANALYZE`. Neither may run inside a transaction.
async fn optimize(State(state): State<AppState>) -> AppResult<Json<Value>> {
    sqlx::query("VACUUM").execute(&state.pool).await?;
    sqlx::query("ANALYZE").execute(&state.pool).await?;
    tracing::info!("Database optimized");
    Ok(Json(json!({ "message": "Database optimized" })))
}
