use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AttachTreatmentRequest, TreatmentError};
use crate::services::TreatmentService;

fn map_treatment_error(e: TreatmentError) -> AppError {
    match e {
        TreatmentError::AppointmentNotFound => {
            AppError::NotFound("Appointment not found".to_string())
        }
        TreatmentError::NotFound => AppError::NotFound("Treatment not found".to_string()),
        TreatmentError::AccessDenied => {
            AppError::Auth("Not authorized to access this treatment".to_string())
        }
        TreatmentError::InvalidStatus(status) => {
            AppError::Conflict(format!("Cannot attach treatment to a {} appointment", status))
        }
        TreatmentError::ValidationError(msg) => AppError::Validation(msg),
        TreatmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Doctors save the treatment record for their own appointment; saving it
/// completes a booked appointment.
#[axum::debug_handler]
pub async fn attach_treatment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AttachTreatmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_doctor() {
        return Err(AppError::Auth("Only doctors can record treatments".to_string()));
    }

    let service = TreatmentService::new(&state);

    let treatment = service
        .attach_treatment(appointment_id, &user.id, request, token)
        .await
        .map_err(map_treatment_error)?;

    Ok(Json(json!({
        "success": true,
        "treatment": treatment,
        "message": "Treatment record saved"
    })))
}

#[axum::debug_handler]
pub async fn get_treatment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let service = TreatmentService::new(&state);

    let treatment = service
        .get_treatment(appointment_id, &user, token)
        .await
        .map_err(map_treatment_error)?;

    Ok(Json(json!(treatment)))
}
