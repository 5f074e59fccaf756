//! `/appointments` routes.
//!
//! Admin: listing, manual creation, deletion, purge by date and roster import.
//! Doctor: own queue, stats, call and status changes. Doctor-scoped routes use
//! the caller's id as the owner filter.

use axum::{
    extract::{DefaultBodyLimit, Extension, Multipart, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, patch, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    errors::{AppError, AppResult},
    middleware::{
        auth_guard::AuthUser,
        role_guard::{require_admin, require_doctor},
    },
    models::{Appointment, AppointmentStatus, AppointmentWithDoctor, CallNotification, NewAppointment},
    services::{
        appointments::{today, AppointmentFilter, StatusCounts},
        pdf_import::ImportReport,
    },
    state::AppState,
};

const MAX_PDF_BYTES: usize = 10 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    let admin = Router::new()
        .route("/appointments",            get(list_appointments).post(create_appointment))
        .route("/appointments/{id}",       delete(delete_appointment))
        .route("/appointments/purge",      post(purge_appointments))
        .route(
            "/appointments/import-pdf",
            post(import_pdf).layer(DefaultBodyLimit::max(MAX_PDF_BYTES)),
        )
        .route_layer(middleware::from_fn(require_admin));

    let doctor = Router::new()
        .route("/appointments/mine",        get(my_appointments))
        .route("/appointments/mine/stats",  get(my_stats))
        .route("/appointments/{id}/call",   post(call_patient))
        .route("/appointments/{id}/status", patch(update_status))
        .route_layer(middleware::from_fn(require_doctor));

    admin.merge(doctor)
}

// ── Request bodies ───────────────────────────────────────────

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct CreateAppointmentBody {
    #[validate(length(min = 1))]
    ticket_number:    String,
    #[validate(length(min = 1))]
    patient_name:     String,
    patient_document: Option<String>,
    #[validate(required)]
    doctor_id:        Option<i64>,
    #[validate(length(min = 1))]
    room:             String,
    #[validate(length(min = 1))]
    date:             String,
    #[validate(length(min = 1))]
    time:             String,
    notes:            Option<String>,
}

#[derive(Deserialize)]
struct MineQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
struct StatusBody {
    status: Option<String>,
}

#[derive(Deserialize)]
struct PurgeBody {
    date: Option<String>,
}

#[derive(Serialize)]
struct CallResponse {
    message: &'static str,
    call:    CallNotification,
}

#[derive(Serialize)]
struct ImportResponse {
    message: String,
    #[serde(flatten)]
    report:  ImportReport,
}

// ── Admin handlers ───────────────────────────────────────────

async fn list_appointments(
    State(state): State<AppState>,
    WithRejection(Query(filter), _): WithRejection<Query<AppointmentFilter>, AppError>,
) -> AppResult<Json<Vec<AppointmentWithDoctor>>> {
    Ok(Json(state.appointments().list(&filter).await?))
}

async fn create_appointment(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<CreateAppointmentBody>, AppError>,
) -> AppResult<(StatusCode, Json<Appointment>)> {
    body.validate()?;
    let doctor_id = body.doctor_id.ok_or_else(|| AppError::BadRequest("doctor_id is required".into()))?;

    let appt = state
        .appointments()
        .insert(&NewAppointment {
            ticket_number:    body.ticket_number.trim().to_owned(),
            patient_name:     body.patient_name.trim().to_owned(),
            patient_document: body.patient_document.filter(|d| !d.trim().is_empty()),
            doctor_id,
            room:             body.room.trim().to_owned(),
            date:             body.date,
            time:             body.time,
            notes:            body.notes,
        })
        .await?;

    tracing::info!(appointment_id = appt.id, doctor_id, ticket = %appt.ticket_number, "Appointment created");
    Ok((StatusCode::CREATED, Json(appt)))
}

async fn delete_appointment(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> AppResult<StatusCode> {
    if !state.appointments().delete(id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(appointment_id = id, "Appointment deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn purge_appointments(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<PurgeBody>, AppError>,
) -> AppResult<Json<serde_json::Value>> {
    let date = body
        .date
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("date is required".into()))?;

    let deleted = state.appointments().delete_by_date(date.trim()).await?;
    tracing::info!(date = %date, deleted, "Appointments purged");
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

async fn import_pdf(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> AppResult<Json<ImportResponse>> {
    let mut pdf: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if !matches!(field.name(), Some("pdf") | Some("file")) {
            continue;
        }

        let is_pdf_type = field.content_type() == Some("application/pdf");
        let is_pdf_name = field
            .file_name()
            .map(|n| n.to_ascii_lowercase().ends_with(".pdf"))
            .unwrap_or(false);
        if !is_pdf_type && !is_pdf_name {
            return Err(AppError::BadRequest("Only PDF files are accepted".into()));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
        pdf = Some(bytes.to_vec());
        break;
    }

    let pdf = pdf.ok_or_else(|| AppError::BadRequest("No PDF file was uploaded".into()))?;
    tracing::info!(user_id = user.user_id, bytes = pdf.len(), "Roster import started");

    let report = state.importer().import_pdf(pdf).await?;
    Ok(Json(ImportResponse {
        message: format!("{} appointments imported", report.inserted_count),
        report,
    }))
}

// ── Doctor handlers ──────────────────────────────────────────

async fn my_appointments(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Query(q), _): WithRejection<Query<MineQuery>, AppError>,
) -> AppResult<Json<Vec<Appointment>>> {
    let date = q.date.filter(|d| !d.is_empty()).unwrap_or_else(today);
    Ok(Json(state.appointments().list_for_doctor(user.user_id, &date).await?))
}

async fn my_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<StatusCounts>> {
    Ok(Json(state.appointments().counts_for_doctor(user.user_id).await?))
}

async fn call_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> AppResult<Json<CallResponse>> {
    let call = state.queue().call(id, user.user_id).await?;
    Ok(Json(CallResponse { message: "Patient called", call }))
}

async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
    WithRejection(Json(body), _): WithRejection<Json<StatusBody>, AppError>,
) -> AppResult<Json<Appointment>> {
    let status = body
        .status
        .ok_or_else(|| AppError::BadRequest("status is required".into()))?
        .parse::<AppointmentStatus>()
        .map_err(AppError::BadRequest)?;

    Ok(Json(state.queue().transition(id, user.user_id, status).await?))
}
