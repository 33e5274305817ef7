//! Session token authentication module
//!
//! `POST /auth/login` issues an HS256 JWT; the `AuthenticatedUser` extractor
//! validates it and resolves the employee from the ledger on every request.

use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;
use clockgate_core::{Role, User};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ApiError;
use crate::state::AppState;

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Employee id
    pub sub: String,
    /// Role at issue time (informational; the ledger is authoritative)
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
}

/// Issues and validates session tokens
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Build from config. Without `JWT_SECRET` a random per-process secret
    /// is used, so tokens do not survive a restart.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let ttl = Duration::from_secs(config.token_ttl_secs);
        match &config.jwt_secret {
            Some(secret) => Ok(Self::new(secret.as_bytes(), ttl)),
            None => {
                tracing::warn!("JWT_SECRET not set, using an ephemeral signing secret");
                let secret = clockgate_core::fresh_challenge()
                    .map_err(|e| ApiError::internal(format!("No entropy for JWT secret: {e}")))?;
                Ok(Self::new(&secret, ttl))
            }
        }
    }

    /// Issue a session token for `user`
    pub fn issue(&self, user: &User) -> Result<String, ApiError> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = SessionClaims {
            sub: user.id.clone(),
            role: user.role,
            iat: now,
            exp: now + self.ttl.as_secs(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &SessionClaims) -> Result<String, ApiError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("Failed to sign session token: {e}")))
    }

    /// Validate a session token and return its claims
    pub fn validate(&self, token: &str) -> Result<SessionClaims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::auth_error("AUTH_TOKEN_EXPIRED", "Session token has expired")
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    ApiError::auth_error("AUTH_INVALID_TOKEN", "Invalid session token signature")
                }
                _ => ApiError::auth_error(
                    "AUTH_INVALID_TOKEN",
                    format!("Session token validation failed: {}", e),
                ),
            })
    }
}

/// Extract the Bearer token from the Authorization header
fn extract_bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| {
            ApiError::auth_error("AUTH_MISSING_TOKEN", "Missing Authorization header")
        })?;

    let auth_value = auth_header.to_str().map_err(|_| {
        ApiError::auth_error(
            "AUTH_INVALID_TOKEN",
            "Invalid Authorization header encoding",
        )
    })?;

    auth_value.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::auth_error(
            "AUTH_INVALID_TOKEN",
            "Authorization header must use Bearer scheme",
        )
    })
}

/// Authenticated employee extractor.
///
/// 1. Reads `Authorization: Bearer <token>`
/// 2. Validates the session token
/// 3. Looks up the employee in the ledger; inactive employees are refused
///
/// Returns 401 with structured error codes on any failure.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
}

impl AuthenticatedUser {
    /// Admin and HR may see and manage everyone's attendance.
    pub fn is_staff(&self) -> bool {
        matches!(self.user.role, Role::Admin | Role::Hr)
    }

    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin or HR role required"))
        }
    }

    /// Allow access to `user_id`'s data for the user themselves or staff.
    pub fn require_self_or_staff(&self, user_id: &str) -> Result<(), ApiError> {
        if self.user.id == user_id || self.is_staff() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Cannot access another employee's data"))
        }
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)?;
        let claims = state.tokens.validate(token)?;

        let user = state.ledger.user(&claims.sub).ok_or_else(|| {
            ApiError::auth_error(
                "AUTH_USER_NOT_FOUND",
                "Valid token but employee not found",
            )
        })?;
        if !user.is_active() {
            return Err(ApiError::auth_error(
                "AUTH_USER_INACTIVE",
                "Employee account is inactive",
            ));
        }

        Ok(AuthenticatedUser { user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clockgate_core::UserStatus;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"test-secret", Duration::from_secs(3600))
    }

    fn bob() -> User {
        User {
            id: "2".into(),
            name: "Bob Employee".into(),
            email: "employee@pardee.com".into(),
            role: Role::Employee,
            department: "Engineering".into(),
            status: UserStatus::Active,
        }
    }

    fn code_of(err: ApiError) -> String {
        match err {
            ApiError::AuthError { code, .. } => code,
            other => panic!("Expected AuthError, got: {:?}", other),
        }
    }

    #[test]
    fn test_issued_token_validates() {
        let issuer = issuer();
        let token = issuer.issue(&bob()).unwrap();
        let claims = issuer.validate(&token).unwrap();
        assert_eq!(claims.sub, "2");
        assert_eq!(claims.role, Role::Employee);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expired_token() {
        let issuer = issuer();
        let now = Utc::now().timestamp() as u64;
        let token = issuer
            .sign(&SessionClaims {
                sub: "2".into(),
                role: Role::Employee,
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();

        assert_eq!(code_of(issuer.validate(&token).unwrap_err()), "AUTH_TOKEN_EXPIRED");
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let token = TokenIssuer::new(b"other-secret", Duration::from_secs(60))
            .issue(&bob())
            .unwrap();
        assert_eq!(code_of(issuer().validate(&token).unwrap_err()), "AUTH_INVALID_TOKEN");
        assert_eq!(
            code_of(issuer().validate("not-a-valid-jwt").unwrap_err()),
            "AUTH_INVALID_TOKEN"
        );
    }

    #[test]
    fn test_extract_bearer_token() {
        let (parts, _) = axum::http::Request::builder()
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(
            code_of(extract_bearer_token(&parts).unwrap_err()),
            "AUTH_MISSING_TOKEN"
        );

        let (parts, _) = axum::http::Request::builder()
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(
            code_of(extract_bearer_token(&parts).unwrap_err()),
            "AUTH_INVALID_TOKEN"
        );

        let (parts, _) = axum::http::Request::builder()
            .header("Authorization", "Bearer my-jwt-token")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(extract_bearer_token(&parts).unwrap(), "my-jwt-token");
    }

    #[test]
    fn test_role_checks() {
        let employee = AuthenticatedUser { user: bob() };
        assert!(employee.require_staff().is_err());
        assert!(employee.require_self_or_staff("2").is_ok());
        assert!(employee.require_self_or_staff("4").is_err());

        let hr = AuthenticatedUser {
            user: User {
                role: Role::Hr,
                ..bob()
            },
        };
        assert!(hr.require_staff().is_ok());
        assert!(hr.require_self_or_staff("4").is_ok());
    }
}
