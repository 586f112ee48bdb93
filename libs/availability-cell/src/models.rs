use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A doctor-declared open interval of availability on a given date.
///
/// All scheduling times in the system are naive wall-clock values; only the
/// audit columns carry a timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AvailabilityWindow {
    /// Materialize the window into the concrete appointment span it offers.
    ///
    /// The whole window becomes one bookable `[start, end)` span; windows are
    /// not sub-divided into fixed-size slots.
    pub fn appointment_span(&self) -> (NaiveDateTime, NaiveDateTime) {
        (
            self.date.and_time(self.start_time),
            self.date.and_time(self.end_time),
        )
    }

    /// Half-open interval test against another time range on the same date.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time < end && start < self.end_time
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWindowRequest {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AvailabilityError {
    #[error("End time must be after start time")]
    InvalidRange,

    #[error("Cannot declare availability on a past date")]
    PastDate,

    #[error("Window overlaps with an existing availability window")]
    Overlap,

    #[error("Window belongs to another doctor")]
    NotOwner,

    #[error("Availability window not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
