//! API integration tests for clockgate-server.
//!
//! These tests drive the router in process, including full verified
//! clock actions signed by the simulated platform authenticator.

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use clockgate_core::{
    AssertionOptions, CeremonyOptions, PlatformAuthenticator, SerializedAssertion,
    SimulatedAuthenticator, UserVerification, FIXTURE_CREDENTIAL,
};
use clockgate_server::{create_router, AppState, Config};
use serde_json::{json, Value};
use tower::ServiceExt;

const ORIGIN: &str = "http://localhost:3000";
const RP_ID: &str = "localhost";

/// Build the test router with fixture employees and simulated ceremonies
fn create_test_app() -> Router {
    let state = AppState::local(&Config::default()).expect("local state");
    create_router(state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn login(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({"email": email, "password": "password"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

/// Fetch a challenge for `user_id` and sign it with `device`.
async fn signed_assertion(
    app: &Router,
    token: &str,
    user_id: &str,
    device: &SimulatedAuthenticator,
) -> Value {
    let (status, options) = send(
        app,
        "POST",
        "/webauthn/login/begin",
        Some(token),
        Some(json!({"userId": user_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "begin failed: {options}");

    let options = CeremonyOptions::from_public_key_json(&options).unwrap();
    let assertion = device
        .get_assertion(&AssertionOptions {
            challenge: options.challenge,
            rp_id: RP_ID.into(),
            origin: ORIGIN.into(),
            allow_credentials: options.allow_credentials,
            timeout: Duration::from_secs(60),
            user_verification: UserVerification::Required,
        })
        .await
        .unwrap();
    serde_json::to_value(SerializedAssertion::from(&assertion)).unwrap()
}

// ============================================================================
// Health & Readiness Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();
    let (status, body) = send(&app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "clockgate-server");
    assert_eq!(body["ceremony_mode"], "simulated");
}

#[tokio::test]
async fn test_ready_and_openapi() {
    let app = create_test_app();
    let (status, body) = send(&app, "GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let (status, doc) = send(&app, "GET", "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/attendance/clock-in"].is_object());
}

// ============================================================================
// Authentication Tests
// ============================================================================

#[tokio::test]
async fn test_login_returns_token_and_user() {
    let app = create_test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({"email": "employee@pardee.com", "password": "anything"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["id"], "2");
    assert_eq!(body["user"]["role"], "employee");
}

#[tokio::test]
async fn test_login_rejects_unknown_inactive_and_empty_password() {
    let app = create_test_app();
    for (email, password) in [
        ("nobody@pardee.com", "password"),
        ("eng@pardee.com", "password"),
        ("employee@pardee.com", ""),
    ] {
        let (status, body) = send(
            &app,
            "POST",
            "/auth/login",
            None,
            Some(json!({"email": email, "password": password})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{email}");
        assert_eq!(body["error"], "Invalid credentials");
        assert_eq!(body["code"], "AUTH_INVALID_CREDENTIALS");
    }
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = create_test_app();
    let (status, body) = send(&app, "GET", "/attendance/history", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_MISSING_TOKEN");

    let (status, body) = send(&app, "GET", "/attendance/history", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_INVALID_TOKEN");
}

// ============================================================================
// Attendance Tests
// ============================================================================

#[tokio::test]
async fn test_history_defaults_to_caller() {
    let app = create_test_app();
    let token = login(&app, "employee@pardee.com").await;

    let (status, body) = send(&app, "GET", "/attendance/history", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r["userId"] == "2"));
}

#[tokio::test]
async fn test_employee_cannot_read_other_history() {
    let app = create_test_app();
    let token = login(&app, "employee@pardee.com").await;
    let (status, _) = send(
        &app,
        "GET",
        "/attendance/history?user_id=4",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let hr = login(&app, "hr@pardee.com").await;
    let (status, body) =
        send(&app, "GET", "/attendance/history?user_id=4", Some(&hr), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_verified_clock_in_then_out() {
    let app = create_test_app();
    let token = login(&app, "employee@pardee.com").await;
    let device = SimulatedAuthenticator::new().with_credential(FIXTURE_CREDENTIAL);

    let assertion = signed_assertion(&app, &token, "2", &device).await;
    let (status, body) = send(
        &app,
        "POST",
        "/attendance/clock-in",
        Some(&token),
        Some(json!({"assertion": assertion, "location": {"lat": 51.5, "lng": -0.12}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Clock-in successful");
    assert_eq!(body["record"]["userId"], "2");
    assert!(body["record"]["clockOut"].is_null());

    // Second clock-in the same day is refused after verification
    let assertion = signed_assertion(&app, &token, "2", &device).await;
    let (status, body) = send(
        &app,
        "POST",
        "/attendance/clock-in",
        Some(&token),
        Some(json!({"assertion": assertion})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "You have already clocked in today.");

    let assertion = signed_assertion(&app, &token, "2", &device).await;
    let (status, body) = send(
        &app,
        "POST",
        "/attendance/clock-out",
        Some(&token),
        Some(json!({"assertion": assertion})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Clock-out successful");
    assert!(body["record"]["totalHours"].is_number());
}

#[tokio::test]
async fn test_clock_out_without_clock_in() {
    let app = create_test_app();
    let token = login(&app, "employee@pardee.com").await;
    let device = SimulatedAuthenticator::new().with_credential(FIXTURE_CREDENTIAL);

    let assertion = signed_assertion(&app, &token, "2", &device).await;
    let (status, body) = send(
        &app,
        "POST",
        "/attendance/clock-out",
        Some(&token),
        Some(json!({"assertion": assertion})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "You haven't clocked in today.");
    assert_eq!(body["code"], "NOT_CLOCKED_IN");
}

#[tokio::test]
async fn test_replayed_assertion_is_rejected() {
    let app = create_test_app();
    let token = login(&app, "employee@pardee.com").await;
    let device = SimulatedAuthenticator::new().with_credential(FIXTURE_CREDENTIAL);

    let assertion = signed_assertion(&app, &token, "2", &device).await;
    let (status, _) = send(
        &app,
        "POST",
        "/attendance/clock-in",
        Some(&token),
        Some(json!({"assertion": assertion.clone()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/attendance/clock-out",
        Some(&token),
        Some(json!({"assertion": assertion})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "No verification challenge is pending.");
    assert_eq!(body["code"], "VERIFICATION_FAILED");
}

#[tokio::test]
async fn test_begin_for_someone_else_is_forbidden() {
    let app = create_test_app();
    let token = login(&app, "employee@pardee.com").await;
    let (status, _) = send(
        &app,
        "POST",
        "/webauthn/login/begin",
        Some(&token),
        Some(json!({"userId": "4"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_begin_without_credential_is_not_found() {
    let app = create_test_app();
    let token = login(&app, "dev@pardee.com").await;
    let (status, _) = send(
        &app,
        "POST",
        "/webauthn/login/begin",
        Some(&token),
        Some(json!({"userId": "4"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "GET",
        "/webauthn/registration-status",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isRegistered"], false);
}

// ============================================================================
// Admin & Reports Tests
// ============================================================================

#[tokio::test]
async fn test_employee_cannot_use_admin_routes() {
    let app = create_test_app();
    let token = login(&app, "employee@pardee.com").await;

    for uri in [
        "/admin/employees",
        "/admin/attendance-logs",
        "/reports/absenteeism-trends",
        "/reports/working-hours",
    ] {
        let (status, body) = send(&app, "GET", uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(body["code"], "FORBIDDEN");
    }
}

#[tokio::test]
async fn test_employee_lifecycle() {
    let app = create_test_app();
    let token = login(&app, "admin@pardee.com").await;

    let (status, created) = send(
        &app,
        "POST",
        "/admin/employees",
        Some(&token),
        Some(json!({
            "name": "Grace Hopper",
            "email": "grace@pardee.com",
            "role": "employee",
            "department": "Engineering"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["status"], "Active");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/admin/employees/{id}"),
        Some(&token),
        Some(json!({"department": "Research"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["department"], "Research");
    assert_eq!(updated["name"], "Grace Hopper");

    let (status, removed) = send(
        &app,
        "DELETE",
        &format!("/admin/employees/{id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["status"], "Inactive");

    // Deactivated employees can no longer log in
    let (status, _) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({"email": "grace@pardee.com", "password": "password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_employee_with_taken_email() {
    let app = create_test_app();
    let token = login(&app, "hr@pardee.com").await;
    let (status, body) = send(
        &app,
        "POST",
        "/admin/employees",
        Some(&token),
        Some(json!({
            "name": "Bob Again",
            "email": "employee@pardee.com",
            "role": "employee",
            "department": "Engineering"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_EMAIL");

    let (status, _) = send(
        &app,
        "PUT",
        "/admin/employees/99",
        Some(&token),
        Some(json!({"name": "Nobody"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_attendance_logs_search() {
    let app = create_test_app();
    let token = login(&app, "admin@pardee.com").await;

    let (status, body) = send(
        &app,
        "GET",
        "/admin/attendance-logs?search=david",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r["userName"] == "David Developer"));
}

#[tokio::test]
async fn test_reports() {
    let app = create_test_app();
    let token = login(&app, "hr@pardee.com").await;

    let (status, trends) =
        send(&app, "GET", "/reports/absenteeism-trends", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trends[0], json!({"name": "Mon", "Present": 140, "Absent": 10}));

    let (status, hours) = send(&app, "GET", "/reports/working-hours", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hours.as_array().unwrap().len(), 5);
    assert_eq!(hours[3]["avgHours"], 8.2);
}
