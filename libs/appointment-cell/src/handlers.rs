// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentStatus, BookAppointmentRequest, BookingError, CancelActor,
    RescheduleAppointmentRequest, TransitionStatusRequest,
};
use crate::services::booking::BookingService;

#[derive(Debug, Deserialize)]
pub struct AppointmentQueryParams {
    pub status: Option<AppointmentStatus>,
}

fn map_booking_error(e: BookingError) -> AppError {
    match e {
        BookingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        BookingError::WindowNotFound => {
            AppError::NotFound("Availability window not found".to_string())
        }
        BookingError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        BookingError::SlotTaken => {
            AppError::Conflict("This slot overlaps with an existing appointment".to_string())
        }
        BookingError::PatientRestricted => {
            AppError::Auth("Patient account is restricted from booking".to_string())
        }
        BookingError::InvalidReason(msg) => AppError::Validation(msg),
        BookingError::InvalidTransition { from, to } => {
            AppError::Conflict(format!("Cannot move appointment from {} to {}", from, to))
        }
        BookingError::AccessDenied => {
            AppError::Auth("Not authorized to access this appointment".to_string())
        }
        BookingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn parse_actor_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid actor identity".to_string()))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

/// Patients book the whole span of an open window for themselves.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_patient() {
        return Err(AppError::Auth("Only patients can book appointments".to_string()));
    }
    let patient_id = parse_actor_id(&user)?;

    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .book_appointment(patient_id, request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let actor = if user.is_admin() {
        CancelActor::Admin
    } else if user.is_patient() {
        CancelActor::Patient
    } else {
        return Err(AppError::Auth("Doctors cannot cancel appointments directly".to_string()));
    };

    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .cancel_appointment(appointment_id, &user, actor, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_patient() {
        return Err(AppError::Auth("Only patients can reschedule their appointments".to_string()));
    }

    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .reschedule_appointment(appointment_id, &user, request.new_window_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled"
    })))
}

/// Doctors mark their own appointments completed.
#[axum::debug_handler]
pub async fn transition_appointment_status(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<TransitionStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_doctor() {
        return Err(AppError::Auth("Only doctors can update appointment status".to_string()));
    }

    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .transition_status(appointment_id, &user.id, request.status, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment marked as {}", appointment.status)
    })))
}

// ==============================================================================
// READ HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_booking_error)?;

    let is_patient = appointment.patient_id.to_string() == user.id;
    let is_doctor = appointment.doctor_id.to_string() == user.id;

    if !is_patient && !is_doctor && !user.is_admin() {
        return Err(AppError::Auth("Not authorized to view this appointment".to_string()));
    }

    Ok(Json(json!(appointment)))
}

/// Patients see their own history; doctors and admins may review any
/// patient's past appointments.
#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    Query(params): Query<AppointmentQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let is_self = user.is_patient() && patient_id.to_string() == user.id;
    if !is_self && !user.is_doctor() && !user.is_admin() {
        return Err(AppError::Auth("Not authorized to view these appointments".to_string()));
    }

    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .list_patient_appointments(patient_id, params.status, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "patient_id": patient_id,
        "appointments": appointments
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(params): Query<AppointmentQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let is_self = user.is_doctor() && doctor_id.to_string() == user.id;
    if !is_self && !user.is_admin() {
        return Err(AppError::Auth("Not authorized to view these appointments".to_string()));
    }

    let booking_service = BookingService::new(&state);

    let appointments = booking_service
        .list_doctor_appointments(doctor_id, params.status, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "appointments": appointments
    })))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

/// Deactivate a doctor: all booked appointments are force-cancelled as an
/// administrative action before the profile goes inactive.
#[axum::debug_handler]
pub async fn deactivate_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin() {
        return Err(AppError::Auth("Only administrators can deactivate doctors".to_string()));
    }

    let booking_service = BookingService::new(&state);

    let cancelled_count = booking_service
        .deactivate_doctor(doctor_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "cancelled_appointments": cancelled_count,
        "message": "Doctor deactivated"
    })))
}
