use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentStatus, BookAppointmentRequest, BookingError, CancelActor,
};
use appointment_cell::services::BookingService;
use shared_models::auth::User;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn service_for(mock_server: &MockServer) -> BookingService {
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    BookingService::new(&config)
}

fn patient_user(patient_id: Uuid) -> User {
    User {
        id: patient_id.to_string(),
        email: None,
        role: Some("patient".to_string()),
        metadata: None,
        created_at: None,
    }
}

fn admin_user() -> User {
    User {
        id: Uuid::new_v4().to_string(),
        email: None,
        role: Some("admin".to_string()),
        metadata: None,
        created_at: None,
    }
}

async fn mock_patient(mock_server: &MockServer, patient_id: Uuid, is_blacklisted: bool) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id.to_string(), "Test Patient", is_blacklisted)
        ])))
        .mount(mock_server)
        .await;
}

async fn mock_window(mock_server: &MockServer, window_id: Uuid, doctor_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_windows"))
        .and(query_param("id", format!("eq.{}", window_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::window_response(
                &window_id.to_string(),
                &doctor_id.to_string(),
                "2030-06-01",
                "10:00:00",
                "13:00:00",
            )
        ])))
        .mount(mock_server)
        .await;
}

async fn mock_conflict_query(mock_server: &MockServer, doctor_id: Uuid, rows: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(mock_server)
        .await;
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn book_appointment_takes_whole_window() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let window_id = Uuid::new_v4();

    mock_patient(&mock_server, patient_id, false).await;
    mock_window(&mock_server, window_id, doctor_id).await;
    mock_conflict_query(&mock_server, doctor_id, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "start_time": "2030-06-01T10:00:00",
            "end_time": "2030-06-01T13:00:00",
            "status": "booked"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2030-06-01T10:00:00",
                "2030-06-01T13:00:00",
                "booked",
            )
        ])))
        .mount(&mock_server)
        .await;

    let appointment = service
        .book_appointment(
            patient_id,
            BookAppointmentRequest {
                window_id,
                reason: "checkup".to_string(),
            },
            "token",
        )
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Booked);
    // Span equals the originating window's duration exactly
    assert_eq!(appointment.duration_minutes(), 180);
}

#[tokio::test]
async fn second_booking_of_same_window_is_slot_taken() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let window_id = Uuid::new_v4();

    mock_patient(&mock_server, patient_id, false).await;
    mock_window(&mock_server, window_id, doctor_id).await;
    mock_conflict_query(
        &mock_server,
        doctor_id,
        json!([MockSupabaseResponses::appointment_response(
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            &doctor_id.to_string(),
            "2030-06-01T10:00:00",
            "2030-06-01T13:00:00",
            "booked",
        )]),
    )
    .await;

    let result = service
        .book_appointment(
            patient_id,
            BookAppointmentRequest {
                window_id,
                reason: "checkup".to_string(),
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::SlotTaken));
}

#[tokio::test]
async fn cancelled_appointments_do_not_block_rebooking() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let window_id = Uuid::new_v4();

    mock_patient(&mock_server, patient_id, false).await;
    mock_window(&mock_server, window_id, doctor_id).await;
    // Even if the store hands back a cancelled row, it must not count
    mock_conflict_query(
        &mock_server,
        doctor_id,
        json!([MockSupabaseResponses::appointment_response(
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            &doctor_id.to_string(),
            "2030-06-01T10:00:00",
            "2030-06-01T13:00:00",
            "cancelled",
        )]),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2030-06-01T10:00:00",
                "2030-06-01T13:00:00",
                "booked",
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = service
        .book_appointment(
            patient_id,
            BookAppointmentRequest {
                window_id,
                reason: "follow-up visit".to_string(),
            },
            "token",
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn blacklisted_patient_is_restricted() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();

    mock_patient(&mock_server, patient_id, true).await;

    let result = service
        .book_appointment(
            patient_id,
            BookAppointmentRequest {
                window_id: Uuid::new_v4(),
                reason: "checkup".to_string(),
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::PatientRestricted));
}

#[tokio::test]
async fn empty_reason_is_rejected() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let result = service
        .book_appointment(
            Uuid::new_v4(),
            BookAppointmentRequest {
                window_id: Uuid::new_v4(),
                reason: "  ".to_string(),
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::InvalidReason(_)));
}

#[tokio::test]
async fn unknown_patient_is_rejected() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = service
        .book_appointment(
            Uuid::new_v4(),
            BookAppointmentRequest {
                window_id: Uuid::new_v4(),
                reason: "checkup".to_string(),
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::PatientNotFound));
}

#[tokio::test]
async fn unknown_window_is_rejected() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    mock_patient(&mock_server, patient_id, false).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_windows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = service
        .book_appointment(
            patient_id,
            BookAppointmentRequest {
                window_id: Uuid::new_v4(),
                reason: "checkup".to_string(),
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::WindowNotFound));
}

#[tokio::test]
async fn booking_race_lost_at_commit_is_slot_taken() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let window_id = Uuid::new_v4();

    mock_patient(&mock_server, patient_id, false).await;
    mock_window(&mock_server, window_id, doctor_id).await;
    // The check saw a free slot...
    mock_conflict_query(&mock_server, doctor_id, json!([])).await;

    // ...but a concurrent booking committed first
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "duplicate key value violates unique constraint"
        })))
        .mount(&mock_server)
        .await;

    let result = service
        .book_appointment(
            patient_id,
            BookAppointmentRequest {
                window_id,
                reason: "checkup".to_string(),
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::SlotTaken));
}

// ==============================================================================
// CANCELLATION
// ==============================================================================

async fn mock_appointment_by_id(
    mock_server: &MockServer,
    appointment_id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
    status: &str,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2030-06-01T10:00:00",
                "2030-06-01T13:00:00",
                status,
            )
        ])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn patient_cancels_own_appointment() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    mock_appointment_by_id(&mock_server, appointment_id, patient_id, doctor_id, "booked").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({
            "status": "cancelled",
            "canceled_by": "patient"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2030-06-01T10:00:00",
                "2030-06-01T13:00:00",
                "cancelled",
            )
        ])))
        .mount(&mock_server)
        .await;

    let appointment = service
        .cancel_appointment(appointment_id, &patient_user(patient_id), CancelActor::Patient, "token")
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn patient_cannot_cancel_someone_elses_appointment() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();
    let intruder_id = Uuid::new_v4();

    mock_appointment_by_id(&mock_server, appointment_id, owner_id, Uuid::new_v4(), "booked").await;

    let result = service
        .cancel_appointment(appointment_id, &patient_user(intruder_id), CancelActor::Patient, "token")
        .await;

    assert_matches!(result, Err(BookingError::AccessDenied));
}

#[tokio::test]
async fn completed_appointment_cannot_be_cancelled() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    mock_appointment_by_id(&mock_server, appointment_id, patient_id, Uuid::new_v4(), "completed").await;

    let result = service
        .cancel_appointment(appointment_id, &patient_user(patient_id), CancelActor::Patient, "token")
        .await;

    assert_matches!(
        result,
        Err(BookingError::InvalidTransition {
            from: AppointmentStatus::Completed,
            to: AppointmentStatus::Cancelled,
        })
    );
}

#[tokio::test]
async fn admin_cancels_any_appointment() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    mock_appointment_by_id(&mock_server, appointment_id, patient_id, doctor_id, "booked").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({"canceled_by": "admin"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2030-06-01T10:00:00",
                "2030-06-01T13:00:00",
                "cancelled",
            )
        ])))
        .mount(&mock_server)
        .await;

    let result = service
        .cancel_appointment(appointment_id, &admin_user(), CancelActor::Admin, "token")
        .await;

    assert!(result.is_ok());
}

// ==============================================================================
// RESCHEDULING
// ==============================================================================

#[tokio::test]
async fn reschedule_cancels_with_distinct_tag_then_rebooks() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let new_window_id = Uuid::new_v4();

    mock_appointment_by_id(&mock_server, appointment_id, patient_id, doctor_id, "booked").await;

    // Cancel half: must carry the reschedule marker, not a plain cancel
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(body_partial_json(json!({"canceled_by": "patient_reschedule"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2030-06-01T10:00:00",
                "2030-06-01T13:00:00",
                "cancelled",
            )
        ])))
        .mount(&mock_server)
        .await;

    // Rebook half: the normal booking flow runs again
    mock_patient(&mock_server, patient_id, false).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_windows"))
        .and(query_param("id", format!("eq.{}", new_window_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::window_response(
                &new_window_id.to_string(),
                &doctor_id.to_string(),
                "2030-06-08",
                "09:00:00",
                "11:00:00",
            )
        ])))
        .mount(&mock_server)
        .await;

    mock_conflict_query(&mock_server, doctor_id, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2030-06-08T09:00:00",
                "2030-06-08T11:00:00",
                "booked",
            )
        ])))
        .mount(&mock_server)
        .await;

    let appointment = service
        .reschedule_appointment(appointment_id, &patient_user(patient_id), new_window_id, "token")
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Booked);
    assert_eq!(appointment.duration_minutes(), 120);
}

// ==============================================================================
// STATUS TRANSITIONS
// ==============================================================================

#[tokio::test]
async fn doctor_completes_own_appointment() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    mock_appointment_by_id(&mock_server, appointment_id, patient_id, doctor_id, "booked").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({"status": "completed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2030-06-01T10:00:00",
                "2030-06-01T13:00:00",
                "completed",
            )
        ])))
        .mount(&mock_server)
        .await;

    let appointment = service
        .transition_status(
            appointment_id,
            &doctor_id.to_string(),
            AppointmentStatus::Completed,
            "token",
        )
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn doctor_cannot_cancel_through_status_update() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    mock_appointment_by_id(&mock_server, appointment_id, Uuid::new_v4(), doctor_id, "booked").await;

    let result = service
        .transition_status(
            appointment_id,
            &doctor_id.to_string(),
            AppointmentStatus::Cancelled,
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::AccessDenied));
}

#[tokio::test]
async fn other_doctor_cannot_complete_appointment() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let appointment_id = Uuid::new_v4();

    mock_appointment_by_id(&mock_server, appointment_id, Uuid::new_v4(), Uuid::new_v4(), "booked").await;

    let result = service
        .transition_status(
            appointment_id,
            &Uuid::new_v4().to_string(),
            AppointmentStatus::Completed,
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::AccessDenied));
}

// ==============================================================================
// DOCTOR DEACTIVATION CASCADE
// ==============================================================================

#[tokio::test]
async fn deactivating_doctor_cancels_booked_appointments_only() {
    let mock_server = MockServer::start().await;
    let service = service_for(&mock_server);

    let doctor_id = Uuid::new_v4();

    // Bulk patch targets booked rows and tags the admin actor
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("status", "eq.booked"))
        .and(body_partial_json(json!({
            "status": "cancelled",
            "canceled_by": "admin"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "2030-06-01T10:00:00",
                "2030-06-01T13:00:00",
                "cancelled",
            ),
            MockSupabaseResponses::appointment_response(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &doctor_id.to_string(),
                "2030-06-02T10:00:00",
                "2030-06-02T13:00:00",
                "cancelled",
            )
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .and(body_partial_json(json!({"is_active": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let cancelled = service.deactivate_doctor(doctor_id, "token").await.unwrap();

    assert_eq!(cancelled, 2);
}
