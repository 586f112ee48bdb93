// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentStatus, BookingError};

/// The appointment state machine.
///
/// `can_transition_to` is the single source of truth for transition
/// legality; every mutation path (doctor status update, patient cancel,
/// admin cancel, treatment auto-complete) goes through it. The only
/// sanctioned exception is the doctor-deactivation cascade, which is an
/// administrative override and still records who forced the cancellation.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Pure legality predicate. Booked is the only state with outgoing
    /// transitions; Completed and Cancelled are terminal.
    pub fn can_transition_to(
        &self,
        current: &AppointmentStatus,
        target: &AppointmentStatus,
    ) -> bool {
        self.valid_transitions(current).contains(target)
    }

    pub fn valid_transitions(&self, current: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Booked => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    pub fn validate_transition(
        &self,
        current: &AppointmentStatus,
        target: &AppointmentStatus,
    ) -> Result<(), BookingError> {
        debug!("Validating status transition from {} to {}", current, target);

        if !self.can_transition_to(current, target) {
            warn!("Invalid status transition attempted: {} -> {}", current, target);
            return Err(BookingError::InvalidTransition {
                from: *current,
                to: *target,
            });
        }

        Ok(())
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
