//! HTTP client for `clockgate-server` with retry and backoff.
//!
//! Idempotent requests (reads, ceremony begin) retry transient failures with
//! exponential backoff. Clock actions and registration finish are sent once.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::ceremony::{BackendError, CeremonyBackend, CeremonyOptions};
use crate::error::{Result, ServiceError};
use crate::service::{
    AttendanceService, ClockResponse, ClockSubmission, LoginResponse, RegistrationService,
};
use crate::types::{
    AbsenteeismPoint, AttendanceRecord, LogFilter, Reports, User, WorkingHoursPoint,
};

/// Configuration for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Server base URL, e.g. `http://localhost:3000/`.
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for transient errors.
    pub max_retries: u32,
    /// Initial retry interval.
    pub initial_interval: Duration,
    /// Maximum retry interval.
    pub max_interval: Duration,
}

impl HttpBackendConfig {
    pub fn new(mut base_url: Url) -> Self {
        // Relative joins keep any path prefix only with a trailing slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct Verified {
    verified: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationStatus {
    is_registered: bool,
}

pub struct HttpBackend {
    client: Client,
    config: HttpBackendConfig,
    token: RwLock<Option<String>>,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            token: RwLock::new(None),
        })
    }

    /// Bearer token sent with every request.
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        idempotent: bool,
    ) -> Result<T> {
        let url = self
            .config
            .base_url
            .join(path)
            .map_err(|e| ServiceError::Network(format!("Invalid URL for {path}: {e}")))?;
        let token = self.token().await;

        let attempt = || {
            let method = &method;
            let url = &url;
            let token = token.as_deref();
            async move { self.send_once(method, url, token, query, body).await }
        };

        if !idempotent {
            return attempt().await.map_err(|e| match e {
                backoff::Error::Permanent(err) | backoff::Error::Transient { err, .. } => err,
            });
        }

        retry_notify(
            self.build_backoff(),
            attempt,
            |err: ServiceError, duration: Duration| {
                warn!(
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: &Method,
        url: &Url,
        token: Option<&str>,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> std::result::Result<T, backoff::Error<ServiceError>> {
        let start = Instant::now();

        let mut request = self.client.request(method.clone(), url.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            let latency_ms = start.elapsed().as_millis() as u64;
            let err = ServiceError::Network(e.to_string());
            if is_transient_error(&e) {
                warn!(error = %e, latency_ms, "Transient error, will retry");
                backoff::Error::transient(err)
            } else {
                warn!(error = %e, latency_ms, "Permanent error, aborting");
                backoff::Error::permanent(err)
            }
        })?;

        let status = response.status();
        debug!(%method, url = %url, status = %status, "Received HTTP response");

        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            let err = status_error(status, message);
            return if is_transient_status(status) {
                Err(backoff::Error::transient(err))
            } else {
                Err(backoff::Error::permanent(err))
            };
        }

        response.json::<T>().await.map_err(|e| {
            warn!(error = %e, "Failed to parse JSON response");
            backoff::Error::permanent(ServiceError::Decode(e.to_string()))
        })
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            max_elapsed_time: Some(self.config.timeout * self.config.max_retries),
            ..Default::default()
        }
    }

    async fn clock(&self, path: &str, submission: &ClockSubmission) -> Result<ClockResponse> {
        let body = json!({
            "assertion": submission.assertion,
            "location": submission.event.location,
        });
        self.request(Method::POST, path, &[], Some(&body), false)
            .await
    }
}

/// Map a non-success status and server message to a service error.
fn status_error(status: StatusCode, message: String) -> ServiceError {
    match status {
        StatusCode::UNAUTHORIZED => ServiceError::Unauthorized,
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            ServiceError::Network(format!("{status}: {message}"))
        }
        _ => ServiceError::Rejected(message),
    }
}

/// Check if a reqwest error is transient and should be retried.
fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Check if an HTTP status code indicates a transient error.
fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

#[async_trait]
impl AttendanceService for HttpBackend {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = json!({ "email": email, "password": password });
        let response: LoginResponse = self
            .request(Method::POST, "auth/login", &[], Some(&body), true)
            .await?;
        self.set_token(Some(response.token.clone())).await;
        Ok(response)
    }

    async fn fetch_history(&self, user_id: &str) -> Result<Vec<AttendanceRecord>> {
        self.request(
            Method::GET,
            "attendance/history",
            &[("user_id", user_id.to_string())],
            None,
            true,
        )
        .await
    }

    async fn clock_in(&self, submission: &ClockSubmission) -> Result<ClockResponse> {
        self.clock("attendance/clock-in", submission).await
    }

    async fn clock_out(&self, submission: &ClockSubmission) -> Result<ClockResponse> {
        self.clock("attendance/clock-out", submission).await
    }

    async fn list_employees(&self) -> Result<Vec<User>> {
        self.request(Method::GET, "admin/employees", &[], None, true)
            .await
    }

    async fn list_attendance_logs(&self, filter: &LogFilter) -> Result<Vec<AttendanceRecord>> {
        let mut query = Vec::new();
        if let Some(date) = filter.date {
            query.push(("date", date.format("%Y-%m-%d").to_string()));
        }
        if let Some(search) = &filter.search {
            query.push(("search", search.clone()));
        }
        self.request(Method::GET, "admin/attendance-logs", &query, None, true)
            .await
    }

    async fn get_reports(&self) -> Result<Reports> {
        let absenteeism_trends: Vec<AbsenteeismPoint> = self
            .request(Method::GET, "reports/absenteeism-trends", &[], None, true)
            .await?;
        let working_hours: Vec<WorkingHoursPoint> = self
            .request(Method::GET, "reports/working-hours", &[], None, true)
            .await?;
        Ok(Reports {
            absenteeism_trends,
            working_hours,
        })
    }
}

/// The server identifies the registering user by bearer token; `user_id`
/// is not sent.
#[async_trait]
impl RegistrationService for HttpBackend {
    async fn begin_registration(&self, _user_id: &str) -> Result<Value> {
        self.request(
            Method::POST,
            "webauthn/register/begin",
            &[],
            Some(&json!({})),
            true,
        )
        .await
    }

    async fn finish_registration(&self, _user_id: &str, credential: &Value) -> Result<bool> {
        let verified: Verified = self
            .request(
                Method::POST,
                "webauthn/register/finish",
                &[],
                Some(credential),
                false,
            )
            .await?;
        Ok(verified.verified)
    }

    async fn registration_status(&self, _user_id: &str) -> Result<bool> {
        let status: RegistrationStatus = self
            .request(
                Method::GET,
                "webauthn/registration-status",
                &[],
                None,
                true,
            )
            .await?;
        Ok(status.is_registered)
    }
}

#[async_trait]
impl CeremonyBackend for HttpBackend {
    async fn begin(&self, subject_id: &str) -> std::result::Result<CeremonyOptions, BackendError> {
        let body = json!({ "userId": subject_id });
        let options: Value = self
            .request(Method::POST, "webauthn/login/begin", &[], Some(&body), true)
            .await
            .map_err(|e| match e {
                ServiceError::NotFound(_) => BackendError::NoCredential(subject_id.to_string()),
                ServiceError::Network(detail) => BackendError::Network(detail),
                other => BackendError::Rejected(other.to_string()),
            })?;
        CeremonyOptions::from_public_key_json(&options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let config = HttpBackendConfig::new(Url::parse("http://localhost:3000/api").unwrap());
        assert_eq!(
            config.base_url.join("attendance/history").unwrap().as_str(),
            "http://localhost:3000/api/attendance/history"
        );

        let bare = HttpBackendConfig::new(Url::parse("http://localhost:3000").unwrap());
        assert_eq!(
            bare.base_url.join("auth/login").unwrap().as_str(),
            "http://localhost:3000/auth/login"
        );
    }

    #[test]
    fn test_status_error_mapping() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, "x".into()),
            ServiceError::Unauthorized
        );
        assert_eq!(
            status_error(StatusCode::CONFLICT, "You have already clocked in today.".into())
                .to_string(),
            "You have already clocked in today."
        );
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "user 9".into()),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "down".into()),
            ServiceError::Network(_)
        ));
    }

    #[test]
    fn test_transient_status_codes() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::CONFLICT));
        assert!(!is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let mut config = HttpBackendConfig::new(Url::parse("http://127.0.0.1:9/").unwrap());
        config.max_retries = 1;
        config.timeout = Duration::from_millis(200);
        config.initial_interval = Duration::from_millis(10);
        let backend = HttpBackend::new(config).unwrap();

        let err = backend.begin("u-42").await.unwrap_err();
        assert!(matches!(err, BackendError::Network(_)));
    }
}
