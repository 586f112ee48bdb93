use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DbError, SupabaseClient};

use crate::models::{AvailabilityError, AvailabilityWindow, CreateWindowRequest};

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Declare a new open window for a doctor.
    ///
    /// Rejects inverted ranges, past dates (unless the caller is back-filling
    /// historical data with `allow_backfill`) and any window intersecting an
    /// existing one for the same doctor and date. The unique constraint on
    /// (doctor_id, date, start_time) backstops concurrent inserts; a conflict
    /// at commit surfaces as `Overlap` like the in-flight check would.
    pub async fn create_window(
        &self,
        doctor_id: Uuid,
        request: CreateWindowRequest,
        allow_backfill: bool,
        auth_token: &str,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        debug!("Creating availability window for doctor {} on {}", doctor_id, request.date);

        if request.end_time <= request.start_time {
            return Err(AvailabilityError::InvalidRange);
        }

        if !allow_backfill && request.date < Utc::now().date_naive() {
            return Err(AvailabilityError::PastDate);
        }

        let existing = self.get_windows_for_date(doctor_id, request.date, auth_token).await?;
        if existing.iter().any(|w| w.overlaps(request.start_time, request.end_time)) {
            warn!("Overlapping window rejected for doctor {} on {}", doctor_id, request.date);
            return Err(AvailabilityError::Overlap);
        }

        let window_data = json!({
            "doctor_id": doctor_id,
            "date": request.date,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "notes": request.notes,
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/availability_windows",
            Some(auth_token),
            Some(window_data),
            Some(headers),
        ).await.map_err(|e| match e {
            DbError::Conflict(_) => AvailabilityError::Overlap,
            other => AvailabilityError::DatabaseError(other.to_string()),
        })?;

        let row = result.into_iter().next()
            .ok_or_else(|| AvailabilityError::DatabaseError("Insert returned no row".to_string()))?;

        let window: AvailabilityWindow = serde_json::from_value(row)
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse window: {}", e)))?;

        debug!("Availability window created with ID: {}", window.id);
        Ok(window)
    }

    /// Remove a window; only its owning doctor may do so.
    pub async fn delete_window(
        &self,
        window_id: Uuid,
        requester_doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        debug!("Deleting availability window {}", window_id);

        let window = self.get_window(window_id, auth_token).await?;
        if window.doctor_id != requester_doctor_id {
            warn!("Doctor {} attempted to delete window {} owned by {}",
                  requester_doctor_id, window_id, window.doctor_id);
            return Err(AvailabilityError::NotOwner);
        }

        let path = format!("/rest/v1/availability_windows?id=eq.{}", window_id);
        let _: Vec<Value> = self.supabase.request(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Open windows for a doctor from a given date onward, ordered by
    /// (date, start_time) ascending. The ordering is what gives "first
    /// available slot" its meaning; callers rely on it.
    pub async fn list_open_windows(
        &self,
        doctor_id: Uuid,
        from_date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        debug!("Listing open windows for doctor {} from {}", doctor_id, from_date);

        let path = format!(
            "/rest/v1/availability_windows?doctor_id=eq.{}&date=gte.{}&order=date.asc,start_time.asc",
            doctor_id, from_date
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let windows: Vec<AvailabilityWindow> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse windows: {}", e)))?;

        Ok(windows)
    }

    pub async fn get_window(
        &self,
        window_id: Uuid,
        auth_token: &str,
    ) -> Result<AvailabilityWindow, AvailabilityError> {
        let path = format!("/rest/v1/availability_windows?id=eq.{}", window_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AvailabilityError::NotFound)?;

        let window: AvailabilityWindow = serde_json::from_value(row)
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse window: {}", e)))?;

        Ok(window)
    }

    async fn get_windows_for_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_windows?doctor_id=eq.{}&date=eq.{}",
            doctor_id, date
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse windows: {}", e)))
    }
}
