// libs/appointment-cell/src/services/conflict.rs
use chrono::NaiveDateTime;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{Appointment, BookingError};

/// Two spans `[a_start, a_end)` and `[b_start, b_end)` overlap iff
/// `a_start < b_end AND b_start < a_end`.
pub fn spans_overlap(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

pub struct ConflictService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Existing non-cancelled appointments of `doctor_id` whose span
    /// overlaps the candidate `[start, end)`.
    ///
    /// The query itself filters by status and range so only rows that can
    /// possibly conflict are fetched; the in-memory check restates the
    /// half-open rule on the decoded rows.
    pub async fn find_conflicts(
        &self,
        doctor_id: Uuid,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        debug!("Checking conflicts for doctor {} from {} to {}", doctor_id, start, end);

        let mut query_parts = vec![
            format!("doctor_id=eq.{}", doctor_id),
            "status=neq.cancelled".to_string(),
            format!("start_time=lt.{}", urlencoding::encode(&ts_param(end))),
            format!("end_time=gt.{}", urlencoding::encode(&ts_param(start))),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=start_time.asc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointments: {}", e)))?;

        let conflicting: Vec<Appointment> = appointments
            .into_iter()
            .filter(|apt| apt.blocks_slot() && spans_overlap(start, end, apt.start_time, apt.end_time))
            .collect();

        if !conflicting.is_empty() {
            warn!("Conflict detected for doctor {} - {} overlapping appointments",
                  doctor_id, conflicting.len());
        }

        Ok(conflicting)
    }

    pub async fn has_conflict(
        &self,
        doctor_id: Uuid,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, BookingError> {
        let conflicts = self
            .find_conflicts(doctor_id, start, end, exclude_appointment_id, auth_token)
            .await?;
        Ok(!conflicts.is_empty())
    }
}

fn ts_param(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn identical_spans_overlap() {
        assert!(spans_overlap(ts(10, 0), ts(13, 0), ts(10, 0), ts(13, 0)));
    }

    #[test]
    fn partial_overlap_detected() {
        assert!(spans_overlap(ts(10, 0), ts(12, 0), ts(11, 0), ts(13, 0)));
        assert!(spans_overlap(ts(11, 0), ts(13, 0), ts(10, 0), ts(12, 0)));
    }

    #[test]
    fn containment_detected() {
        assert!(spans_overlap(ts(10, 0), ts(13, 0), ts(11, 0), ts(12, 0)));
        assert!(spans_overlap(ts(11, 0), ts(12, 0), ts(10, 0), ts(13, 0)));
    }

    #[test]
    fn adjacent_spans_do_not_overlap() {
        // Half-open semantics: [10,12) and [12,14) share only the boundary.
        assert!(!spans_overlap(ts(10, 0), ts(12, 0), ts(12, 0), ts(14, 0)));
        assert!(!spans_overlap(ts(12, 0), ts(14, 0), ts(10, 0), ts(12, 0)));
    }

    #[test]
    fn disjoint_spans_do_not_overlap() {
        assert!(!spans_overlap(ts(8, 0), ts(9, 0), ts(10, 0), ts(11, 0)));
    }
}
