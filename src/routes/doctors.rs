//! `/doctors` routes. Listing is open to every authenticated role; changes
//! are reserved to the system account.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use validator::Validate;

use crate::{
    auth::validate_password_strength,
    errors::{AppError, AppResult},
    middleware::role_guard::require_system,
    models::Doctor,
    services::doctors::{DoctorUpdate, NewDoctor},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    let manage = Router::new()
        .route("/doctors", axum::routing::post(create_doctor))
        .route("/doctors/{id}", get(get_doctor).put(update_doctor).delete(delete_doctor))
        .route_layer(middleware::from_fn(require_system));

    // GET /doctors is merged into the same path as the guarded POST.
    Router::new()
        .route("/doctors", get(list_doctors))
        .merge(manage)
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct CreateDoctorBody {
    #[validate(length(min = 1))]
    username:  String,
    #[validate(length(min = 1))]
    password:  String,
    #[validate(length(min = 1))]
    full_name: String,
    #[validate(length(min = 1))]
    room:      String,
    specialty: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct UpdateDoctorBody {
    #[validate(length(min = 1))]
    username:  String,
    #[validate(length(min = 1))]
    full_name: String,
    #[validate(length(min = 1))]
    room:      String,
    specialty: Option<String>,
    is_active: Option<bool>,
    password:  Option<String>,
}

fn blank_to_none(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

async fn list_doctors(State(state): State<AppState>) -> AppResult<Json<Vec<Doctor>>> {
    Ok(Json(state.doctors().list().await?))
}

async fn get_doctor(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> AppResult<Json<Doctor>> {
    state.doctors().find(id).await?.map(Json).ok_or(AppError::NotFound)
}

async fn create_doctor(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<CreateDoctorBody>, AppError>,
) -> AppResult<(StatusCode, Json<Doctor>)> {
    body.validate()?;
    if !state.config.is_development() {
        validate_password_strength(&body.password)?;
    }
    let doctor = state
        .doctors()
        .create(&NewDoctor {
            username:  body.username,
            password:  body.password,
            full_name: body.full_name,
            room:      body.room,
            specialty: blank_to_none(body.specialty),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(doctor)))
}

async fn update_doctor(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
    WithRejection(Json(body), _): WithRejection<Json<UpdateDoctorBody>, AppError>,
) -> AppResult<Json<Doctor>> {
    body.validate()?;
    let password = blank_to_none(body.password);
    if let (Some(pw), false) = (password.as_deref(), state.config.is_development()) {
        validate_password_strength(pw)?;
    }
    let doctor = state
        .doctors()
        .update(
            id,
            &DoctorUpdate {
                username:  body.username,
                full_name: body.full_name,
                room:      body.room,
                specialty: blank_to_none(body.specialty),
                is_active: body.is_active,
                password,
            },
        )
        .await?;
    Ok(Json(doctor))
}

async fn delete_doctor(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> AppResult<StatusCode> {
    state.doctors().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
