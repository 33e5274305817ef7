//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 specification served at `/api-docs/openapi.json`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers::{ClockRequest, HealthResponse, LoginRequest, ReadyResponse};
use crate::webauthn::{BeginLoginRequest, RegistrationStatusResponse, VerifiedResponse};

/// Clockgate Attendance API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Clockgate - Attendance API",
        version = "0.1.0",
        description = r#"
## Biometric-verified attendance

Every clock-in and clock-out must carry a platform authenticator assertion
(fingerprint, face or device PIN) over a fresh server challenge.

### How It Works

1. Log in via `POST /auth/login` to get a session token
2. Request a challenge via `POST /webauthn/login/begin`
3. Sign it with the enrolled platform authenticator
4. Submit the assertion to `POST /attendance/clock-in` or `/attendance/clock-out`

Admin and HR accounts can manage employees, browse attendance logs and read reports.
"#
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Auth", description = "Session login"),
        (name = "Attendance", description = "Attendance history and verified clock actions"),
        (name = "Admin", description = "Employee management and attendance logs"),
        (name = "Reports", description = "Absenteeism and working-hours series"),
        (name = "WebAuthn", description = "Credential enrollment and verification challenges"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::auth::login,
        crate::handlers::attendance::history,
        crate::handlers::attendance::clock_in,
        crate::handlers::attendance::clock_out,
        crate::handlers::admin::list_employees,
        crate::handlers::admin::create_employee,
        crate::handlers::admin::update_employee,
        crate::handlers::admin::deactivate_employee,
        crate::handlers::admin::attendance_logs,
        crate::handlers::reports::absenteeism_trends,
        crate::handlers::reports::working_hours,
        crate::webauthn::handlers::begin_login,
        crate::webauthn::handlers::begin_registration,
        crate::webauthn::handlers::finish_registration,
        crate::webauthn::handlers::registration_status,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            LoginRequest,
            ClockRequest,
            BeginLoginRequest,
            VerifiedResponse,
            RegistrationStatusResponse,
        )
    ),
    modifiers(&SessionTokenScheme)
)]
pub struct ApiDoc;

/// Registers the bearer scheme the secured paths refer to.
struct SessionTokenScheme;

impl Modify for SessionTokenScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/attendance/clock-in",
            "/attendance/clock-out",
            "/admin/employees/{id}",
            "/webauthn/login/begin",
            "/reports/working-hours",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("session_token"));
    }
}
