use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::AppointmentStatus;

/// Minimum length for diagnosis and prescription text. A data-quality
/// guard, not a security boundary.
pub const MIN_FIELD_LEN: usize = 10;

/// The single treatment record of an appointment (1:1). Created or
/// updated only while the appointment is booked or already completed;
/// saving it is what completes a booked appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub diagnosis: String,
    pub prescription: String,
    pub notes: Option<String>,
    pub doctor_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Treatment {
    /// Patient-facing view: the doctor-only notes column is stripped.
    pub fn redacted_for_patient(mut self) -> Self {
        self.doctor_notes = None;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachTreatmentRequest {
    pub diagnosis: String,
    pub prescription: String,
    pub notes: Option<String>,
    pub doctor_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum TreatmentError {
    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Treatment not found")]
    NotFound,

    #[error("Unauthorized access to treatment")]
    AccessDenied,

    #[error("Cannot attach treatment to a {0} appointment")]
    InvalidStatus(AppointmentStatus),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
