//! Router configuration module
//!
//! Wires the attendance, admin, report and WebAuthn endpoints, the Swagger
//! UI, and the middleware stack.

use std::{sync::Arc, time::Duration};

use axum::{
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::handlers::{
    absenteeism_trends, attendance_logs, clock_in, clock_out, create_employee,
    deactivate_employee, health, history, list_employees, login, ready, update_employee,
    working_hours,
};
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::webauthn::{begin_login, begin_registration, finish_registration, registration_status};

/// Create the application router with default config (for testing)
pub fn create_router(state: AppState) -> Router {
    create_router_with_config(&Config::default(), state)
}

/// Create the application router with custom configuration
pub fn create_router_with_config(config: &Config, state: AppState) -> Router {
    let router = Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes().with_state(state))
        .layer(config.cors_layer())
        .layer(RequestBodyLimitLayer::new(config.body_limit_kb * 1024))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.timeout_secs),
        ));

    with_rate_limit(config, router).layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    let attendance = Router::new()
        .route("/history", get(history))
        .route("/clock-in", post(clock_in))
        .route("/clock-out", post(clock_out));

    let admin = Router::new()
        .route("/employees", get(list_employees).post(create_employee))
        .route(
            "/employees/{id}",
            put(update_employee).delete(deactivate_employee),
        )
        .route("/attendance-logs", get(attendance_logs));

    let reports = Router::new()
        .route("/absenteeism-trends", get(absenteeism_trends))
        .route("/working-hours", get(working_hours));

    let webauthn = Router::new()
        .route("/login/begin", post(begin_login))
        .route("/register/begin", post(begin_registration))
        .route("/register/finish", post(finish_registration))
        .route("/registration-status", get(registration_status));

    Router::new()
        .route("/auth/login", post(login))
        .nest("/attendance", attendance)
        .nest("/admin", admin)
        .nest("/reports", reports)
        .nest("/webauthn", webauthn)
        .route("/health", get(health))
        .route("/ready", get(ready))
}

/// Per-IP rate limiting (disabled in tests, enabled in production).
fn with_rate_limit(config: &Config, router: Router) -> Router {
    if !config.rate_limit_enabled {
        tracing::warn!("Rate limiting: DISABLED");
        return router;
    }

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(config.rate_limit_per_sec)
        .burst_size(config.rate_limit_burst)
        .finish();

    match governor_conf {
        Some(governor_conf) => {
            tracing::info!(
                per_sec = config.rate_limit_per_sec,
                burst = config.rate_limit_burst,
                "Rate limiting enabled"
            );
            router.layer(GovernorLayer::new(Arc::new(governor_conf)))
        }
        None => {
            tracing::error!("Invalid rate limiter config, rate limiting DISABLED");
            router
        }
    }
}
