use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus, BookingError};
use appointment_cell::services::BookingService;
use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};
use shared_models::auth::User;

use crate::models::{AttachTreatmentRequest, Treatment, TreatmentError, MIN_FIELD_LEN};

pub struct TreatmentService {
    supabase: Arc<SupabaseClient>,
    booking_service: BookingService,
}

impl TreatmentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            booking_service: BookingService::new(config),
        }
    }

    /// Attach (or amend) the treatment record of an appointment.
    ///
    /// Upsert keyed by appointment_id: the first call inserts, later calls
    /// update the same row in place. Saving a treatment on a booked
    /// appointment completes it through the state-machine guard; an
    /// appointment already completed just takes the edit.
    pub async fn attach_treatment(
        &self,
        appointment_id: Uuid,
        requester_doctor_id: &str,
        request: AttachTreatmentRequest,
        auth_token: &str,
    ) -> Result<Treatment, TreatmentError> {
        debug!("Attaching treatment to appointment {}", appointment_id);

        let appointment = self.get_owned_appointment(appointment_id, requester_doctor_id, auth_token).await?;

        if appointment.status == AppointmentStatus::Cancelled {
            return Err(TreatmentError::InvalidStatus(appointment.status));
        }

        validate_field("Diagnosis", &request.diagnosis)?;
        validate_field("Prescription", &request.prescription)?;

        let existing = self.find_treatment(appointment_id, auth_token).await?;

        let treatment = match existing {
            Some(current) => self.update_treatment(&current, &request, auth_token).await?,
            None => match self.insert_treatment(appointment_id, &request, auth_token).await? {
                Some(t) => t,
                // Concurrent first attachment: the 1:1 constraint kept one
                // row; fold ours into an update of it.
                None => {
                    let current = self
                        .find_treatment(appointment_id, auth_token)
                        .await?
                        .ok_or(TreatmentError::NotFound)?;
                    self.update_treatment(&current, &request, auth_token).await?
                }
            },
        };

        if appointment.status == AppointmentStatus::Booked {
            self.booking_service
                .transition_status(
                    appointment_id,
                    requester_doctor_id,
                    AppointmentStatus::Completed,
                    auth_token,
                )
                .await
                .map_err(map_completion_error)?;
            info!("Appointment {} completed via treatment attachment", appointment_id);
        }

        Ok(treatment)
    }

    /// Read a treatment: the owning doctor and admins see everything; the
    /// appointment's patient gets the redacted view.
    pub async fn get_treatment(
        &self,
        appointment_id: Uuid,
        requester: &User,
        auth_token: &str,
    ) -> Result<Treatment, TreatmentError> {
        let appointment = self
            .booking_service
            .get_appointment(appointment_id, auth_token)
            .await
            .map_err(|e| match e {
                BookingError::NotFound => TreatmentError::AppointmentNotFound,
                other => TreatmentError::DatabaseError(other.to_string()),
            })?;

        let is_doctor = appointment.doctor_id.to_string() == requester.id;
        let is_patient = appointment.patient_id.to_string() == requester.id;

        if !is_doctor && !is_patient && !requester.is_admin() {
            return Err(TreatmentError::AccessDenied);
        }

        let treatment = self
            .find_treatment(appointment_id, auth_token)
            .await?
            .ok_or(TreatmentError::NotFound)?;

        if is_patient && !is_doctor {
            Ok(treatment.redacted_for_patient())
        } else {
            Ok(treatment)
        }
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn get_owned_appointment(
        &self,
        appointment_id: Uuid,
        requester_doctor_id: &str,
        auth_token: &str,
    ) -> Result<Appointment, TreatmentError> {
        let appointment = self
            .booking_service
            .get_appointment(appointment_id, auth_token)
            .await
            .map_err(|e| match e {
                BookingError::NotFound => TreatmentError::AppointmentNotFound,
                other => TreatmentError::DatabaseError(other.to_string()),
            })?;

        if appointment.doctor_id.to_string() != requester_doctor_id {
            return Err(TreatmentError::AccessDenied);
        }

        Ok(appointment)
    }

    async fn find_treatment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Treatment>, TreatmentError> {
        let path = format!("/rest/v1/treatments?appointment_id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| TreatmentError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| TreatmentError::DatabaseError(format!("Failed to parse treatment: {}", e))),
            None => Ok(None),
        }
    }

    /// Insert the first treatment row; `Ok(None)` means the 1:1 unique
    /// constraint fired because another request inserted concurrently.
    async fn insert_treatment(
        &self,
        appointment_id: Uuid,
        request: &AttachTreatmentRequest,
        auth_token: &str,
    ) -> Result<Option<Treatment>, TreatmentError> {
        let treatment_data = json!({
            "appointment_id": appointment_id,
            "diagnosis": request.diagnosis.trim(),
            "prescription": request.prescription.trim(),
            "notes": request.notes,
            "doctor_notes": request.doctor_notes,
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Result<Vec<Value>, DbError> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/treatments",
            Some(auth_token),
            Some(treatment_data),
            Some(headers),
        ).await;

        let rows = match result {
            Ok(rows) => rows,
            Err(DbError::Conflict(_)) => return Ok(None),
            Err(other) => return Err(TreatmentError::DatabaseError(other.to_string())),
        };

        let row = rows.into_iter().next()
            .ok_or_else(|| TreatmentError::DatabaseError("Insert returned no row".to_string()))?;

        serde_json::from_value(row)
            .map(Some)
            .map_err(|e| TreatmentError::DatabaseError(format!("Failed to parse treatment: {}", e)))
    }

    async fn update_treatment(
        &self,
        current: &Treatment,
        request: &AttachTreatmentRequest,
        auth_token: &str,
    ) -> Result<Treatment, TreatmentError> {
        let patch = json!({
            "diagnosis": request.diagnosis.trim(),
            "prescription": request.prescription.trim(),
            "notes": request.notes,
            "doctor_notes": request.doctor_notes
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let path = format!("/rest/v1/treatments?id=eq.{}", current.id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(patch),
            Some(headers),
        ).await.map_err(|e| TreatmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(TreatmentError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| TreatmentError::DatabaseError(format!("Failed to parse treatment: {}", e)))
    }
}

fn validate_field(name: &str, value: &str) -> Result<(), TreatmentError> {
    if value.trim().len() < MIN_FIELD_LEN {
        return Err(TreatmentError::ValidationError(format!(
            "{} must be at least {} characters",
            name, MIN_FIELD_LEN
        )));
    }
    Ok(())
}

fn map_completion_error(e: BookingError) -> TreatmentError {
    match e {
        BookingError::InvalidTransition { from, .. } => TreatmentError::InvalidStatus(from),
        BookingError::AccessDenied => TreatmentError::AccessDenied,
        BookingError::NotFound => TreatmentError::AppointmentNotFound,
        other => TreatmentError::DatabaseError(other.to_string()),
    }
}
