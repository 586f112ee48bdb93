// libs/appointment-cell/src/services/booking.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::models::AvailabilityError;
use availability_cell::services::AvailabilityService;
use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentStatus, BookAppointmentRequest, BookingError, CancelActor,
    PatientProfile, MIN_REASON_LEN,
};
use crate::services::conflict::ConflictService;
use crate::services::lifecycle::AppointmentLifecycleService;

pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictService,
    lifecycle_service: AppointmentLifecycleService,
    availability_service: AvailabilityService,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            conflict_service: ConflictService::new(Arc::clone(&supabase)),
            lifecycle_service: AppointmentLifecycleService::new(),
            availability_service: AvailabilityService::new(config),
            supabase,
        }
    }

    /// Book the whole span of an availability window for a patient.
    ///
    /// The overlap check and the insert are backstopped by the partial
    /// unique constraint on (doctor_id, start_time) for non-cancelled rows:
    /// when two requests race past the check, the loser's commit comes back
    /// as a conflict and is reported as `SlotTaken`, exactly as if the
    /// check itself had caught it.
    pub async fn book_appointment(
        &self,
        patient_id: Uuid,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        info!("Booking window {} for patient {}", request.window_id, patient_id);

        let reason = request.reason.trim();
        if reason.len() < MIN_REASON_LEN {
            return Err(BookingError::InvalidReason(format!(
                "Reason must be at least {} characters",
                MIN_REASON_LEN
            )));
        }

        let patient = self.get_patient(patient_id, auth_token).await?;
        if patient.is_blacklisted {
            warn!("Blacklisted patient {} attempted to book", patient_id);
            return Err(BookingError::PatientRestricted);
        }

        let window = self
            .availability_service
            .get_window(request.window_id, auth_token)
            .await
            .map_err(|e| match e {
                AvailabilityError::NotFound => BookingError::WindowNotFound,
                other => BookingError::DatabaseError(other.to_string()),
            })?;

        let (start_time, end_time) = window.appointment_span();

        if self
            .conflict_service
            .has_conflict(window.doctor_id, start_time, end_time, None, auth_token)
            .await?
        {
            return Err(BookingError::SlotTaken);
        }

        let appointment_data = json!({
            "patient_id": patient_id,
            "doctor_id": window.doctor_id,
            "start_time": start_time,
            "end_time": end_time,
            "status": AppointmentStatus::Booked,
            "reason": reason,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(headers),
        ).await.map_err(|e| match e {
            // Lost a booking race: the constraint rolled us back.
            DbError::Conflict(_) => {
                warn!("Booking race lost for doctor {} at {}", window.doctor_id, start_time);
                BookingError::SlotTaken
            }
            other => BookingError::DatabaseError(other.to_string()),
        })?;

        let row = result.into_iter().next()
            .ok_or_else(|| BookingError::DatabaseError("Insert returned no row".to_string()))?;

        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e)))?;

        info!("Appointment {} booked with doctor {}", appointment.id, appointment.doctor_id);
        Ok(appointment)
    }

    /// Cancel an appointment. Patients cancel their own; admins cancel any.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        requester: &User,
        actor: CancelActor,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        debug!("Cancelling appointment {} as {}", appointment_id, actor);

        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        let is_own = requester.is_patient()
            && appointment.patient_id.to_string() == requester.id;
        if !is_own && !requester.is_admin() {
            return Err(BookingError::AccessDenied);
        }

        self.lifecycle_service
            .validate_transition(&appointment.status, &AppointmentStatus::Cancelled)?;

        self.update_appointment_status(
            appointment_id,
            AppointmentStatus::Cancelled,
            Some(actor),
            auth_token,
        ).await
    }

    /// Reschedule as cancel-then-rebook: the old appointment is cancelled
    /// with the `patient_reschedule` tag, then the new window goes through
    /// the normal booking flow. If the rebook is rejected the cancellation
    /// stands and the caller picks another window.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        requester: &User,
        new_window_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        debug!("Rescheduling appointment {} to window {}", appointment_id, new_window_id);

        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        if !requester.is_patient() || appointment.patient_id.to_string() != requester.id {
            return Err(BookingError::AccessDenied);
        }

        self.cancel_appointment(
            appointment_id,
            requester,
            CancelActor::PatientReschedule,
            auth_token,
        ).await?;

        self.book_appointment(
            appointment.patient_id,
            BookAppointmentRequest {
                window_id: new_window_id,
                reason: appointment.reason.clone(),
            },
            auth_token,
        ).await
    }

    /// Doctor-driven status change. The only transition a doctor performs
    /// directly is completing their own appointment; cancellations go
    /// through the patient/admin paths.
    pub async fn transition_status(
        &self,
        appointment_id: Uuid,
        requester_doctor_id: &str,
        target: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        debug!("Transitioning appointment {} to {}", appointment_id, target);

        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        if appointment.doctor_id.to_string() != requester_doctor_id {
            return Err(BookingError::AccessDenied);
        }

        if target != AppointmentStatus::Completed {
            return Err(BookingError::AccessDenied);
        }

        self.lifecycle_service
            .validate_transition(&appointment.status, &target)?;

        self.update_appointment_status(appointment_id, target, None, auth_token).await
    }

    /// Administrative cascade: force-cancel every booked appointment of a
    /// doctor, then deactivate the profile. This overrides the per-actor
    /// transition guard by design; the cancellations are tagged as admin
    /// actions so histories stay truthful.
    pub async fn deactivate_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<usize, BookingError> {
        info!("Deactivating doctor {} and cancelling booked appointments", doctor_id);

        let patch = json!({
            "status": AppointmentStatus::Cancelled,
            "canceled_by": CancelActor::Admin,
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=eq.booked",
            doctor_id
        );
        let cancelled: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(patch),
            Some(headers),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let doctor_patch = json!({
            "is_active": false,
            "updated_at": Utc::now().to_rfc3339()
        });
        let doctor_path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let _: Vec<Value> = self.supabase.request(
            Method::PATCH,
            &doctor_path,
            Some(auth_token),
            Some(doctor_patch),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        info!("Doctor {} deactivated, {} appointments cancelled", doctor_id, cancelled.len());
        Ok(cancelled.len())
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(BookingError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    /// A patient's appointments, most recent first (dashboard ordering).
    pub async fn list_patient_appointments(
        &self,
        patient_id: Uuid,
        status: Option<AppointmentStatus>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let mut path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=start_time.desc",
            patient_id
        );
        if let Some(status) = status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        self.fetch_appointments(&path, auth_token).await
    }

    /// A doctor's appointments, soonest first (worklist ordering).
    pub async fn list_doctor_appointments(
        &self,
        doctor_id: Uuid,
        status: Option<AppointmentStatus>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&order=start_time.asc",
            doctor_id
        );
        if let Some(status) = status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        self.fetch_appointments(&path, auth_token).await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<PatientProfile, BookingError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(BookingError::PatientNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse patient: {}", e)))
    }

    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        canceled_by: Option<CancelActor>,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let mut patch = serde_json::Map::new();
        patch.insert("status".to_string(), json!(status));
        if let Some(actor) = canceled_by {
            patch.insert("canceled_by".to_string(), json!(actor));
        }
        patch.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(patch)),
            Some(headers),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(BookingError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    async fn fetch_appointments(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }
}
