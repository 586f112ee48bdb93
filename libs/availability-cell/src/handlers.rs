use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AvailabilityError, CreateWindowRequest};
use crate::services::AvailabilityService;

#[derive(Debug, Deserialize)]
pub struct WindowQueryParams {
    pub from_date: Option<NaiveDate>,
}

fn map_availability_error(e: AvailabilityError) -> AppError {
    match e {
        AvailabilityError::InvalidRange => {
            AppError::Validation("End time must be after start time".to_string())
        }
        AvailabilityError::PastDate => {
            AppError::Validation("Cannot declare availability on a past date".to_string())
        }
        AvailabilityError::Overlap => {
            AppError::Conflict("Window overlaps with an existing availability window".to_string())
        }
        AvailabilityError::NotOwner => {
            AppError::Auth("Window belongs to another doctor".to_string())
        }
        AvailabilityError::NotFound => {
            AppError::NotFound("Availability window not found".to_string())
        }
        AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Doctors declare their own windows; admins may declare (and back-fill
/// past dates) on any doctor's behalf.
#[axum::debug_handler]
pub async fn create_window(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateWindowRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let is_own_schedule = user.is_doctor() && user.id == doctor_id.to_string();
    let is_admin = user.is_admin();

    if !is_own_schedule && !is_admin {
        return Err(AppError::Auth("Not authorized to manage this doctor's availability".to_string()));
    }

    let service = AvailabilityService::new(&state);

    let window = service
        .create_window(doctor_id, request, is_admin, token)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "window": window,
        "message": "Availability window added"
    })))
}

#[axum::debug_handler]
pub async fn delete_window(
    State(state): State<Arc<AppConfig>>,
    Path(window_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_doctor() {
        return Err(AppError::Auth("Only doctors can remove availability windows".to_string()));
    }

    let requester_doctor_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid doctor identity".to_string()))?;

    let service = AvailabilityService::new(&state);

    service
        .delete_window(window_id, requester_doctor_id, token)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Availability window removed"
    })))
}

/// Open windows for a doctor, soonest first. Defaults to today onward.
#[axum::debug_handler]
pub async fn list_windows(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(params): Query<WindowQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let from_date = params.from_date.unwrap_or_else(|| Utc::now().date_naive());

    let service = AvailabilityService::new(&state);

    let windows = service
        .list_open_windows(doctor_id, from_date, token)
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "from_date": from_date,
        "windows": windows
    })))
}
