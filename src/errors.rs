//! Gateway error types.
//!
//! [`UpstreamError`] classifies failures of the remote storage and compute
//! services.  [`GatewayError`] is what handlers return; it implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(GatewayError::Conflict { .. })`.

use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// A failure reported by (or on the way to) a remote service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The addressed resource does not exist upstream.
    #[error("resource not found upstream")]
    NotFound,

    /// A conditional create lost against an existing resource.
    #[error("resource already exists upstream")]
    AlreadyExists,

    /// The gateway's credentials were refused.
    #[error("upstream permission denied: {0}")]
    Permission(String),

    /// Timeouts, connection failures, throttling and 5xx responses.
    #[error("upstream unavailable: {0}")]
    Transient(String),

    /// Any other error the service returned.
    #[error("upstream rejected the request: {0}")]
    Rejected(String),
}

impl UpstreamError {
    /// Short label used for logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            UpstreamError::NotFound => "not_found",
            UpstreamError::AlreadyExists => "already_exists",
            UpstreamError::Permission(_) => "permission",
            UpstreamError::Transient(_) => "transient",
            UpstreamError::Rejected(_) => "rejected",
        }
    }
}

/// Classify an AWS SDK error by HTTP status and service error code.
///
/// Shared by the S3 and Lambda backends; both SDKs surface the same
/// `SdkError<E, HttpResponse>` shape.
pub fn classify_sdk_error<E>(operation: &str, err: SdkError<E, HttpResponse>) -> UpstreamError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().unwrap_or_default().to_string();
    let detail = format!("{operation}: {}", DisplayErrorContext(&err));

    let classified = match (&err, status) {
        (SdkError::TimeoutError(_) | SdkError::DispatchFailure(_), _) => {
            UpstreamError::Transient(detail)
        }
        (_, Some(404)) => UpstreamError::NotFound,
        (_, Some(409 | 412)) => UpstreamError::AlreadyExists,
        (_, Some(401 | 403)) => UpstreamError::Permission(detail),
        (_, Some(s)) if s == 429 || s >= 500 => UpstreamError::Transient(detail),
        _ => classify_code(&code, detail),
    };

    if !matches!(
        classified,
        UpstreamError::NotFound | UpstreamError::AlreadyExists
    ) {
        warn!(operation, code = %code, "upstream call failed: {}", classified);
    }
    classified
}

/// Fallback classification when no HTTP status is available.
fn classify_code(code: &str, detail: String) -> UpstreamError {
    match code {
        "NoSuchKey" | "NoSuchBucket" | "NotFound" | "ResourceNotFoundException" => {
            UpstreamError::NotFound
        }
        "ResourceConflictException" | "PreconditionFailed" | "ConditionalRequestConflict" => {
            UpstreamError::AlreadyExists
        }
        c if c.starts_with("AccessDenied") || c == "InvalidAccessKeyId" => {
            UpstreamError::Permission(detail)
        }
        "SlowDown" | "ThrottlingException" | "TooManyRequestsException" | "ServiceException"
        | "RequestTimeout" => UpstreamError::Transient(detail),
        "" => UpstreamError::Transient(detail),
        _ => UpstreamError::Rejected(detail),
    }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Create on a name that is already taken.
    #[error("{kind} <{name}> already exists.")]
    Conflict { kind: &'static str, name: String },

    /// Operation on a name that does not exist.
    #[error("{kind} <{name}> not found.")]
    NotFound { kind: &'static str, name: String },

    /// Multipart request without a `file` part.
    #[error("No file uploaded")]
    MissingUpload,

    /// A dataset, page or function name failed validation.
    #[error("Invalid name <{name}>: {reason}")]
    InvalidName { name: String, reason: String },

    /// A request argument is invalid.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// Classified remote failure.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Catch-all for unexpected internal errors.
    #[error("We encountered an internal error, please try again.")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Machine-readable error code placed in the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Conflict { .. } => "Conflict",
            GatewayError::NotFound { .. } => "NotFound",
            GatewayError::MissingUpload => "MissingUpload",
            GatewayError::InvalidName { .. } => "InvalidName",
            GatewayError::InvalidArgument { .. } => "InvalidArgument",
            GatewayError::Upstream(UpstreamError::NotFound) => "UpstreamNotFound",
            GatewayError::Upstream(UpstreamError::AlreadyExists) => "UpstreamConflict",
            GatewayError::Upstream(UpstreamError::Permission(_)) => "UpstreamPermissionDenied",
            GatewayError::Upstream(UpstreamError::Transient(_)) => "UpstreamUnavailable",
            GatewayError::Upstream(UpstreamError::Rejected(_)) => "UpstreamRejected",
            GatewayError::Internal(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Conflict { .. } => StatusCode::CONFLICT,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::MissingUpload => StatusCode::BAD_REQUEST,
            GatewayError::InvalidName { .. } => StatusCode::BAD_REQUEST,
            GatewayError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(UpstreamError::NotFound) => StatusCode::NOT_FOUND,
            GatewayError::Upstream(UpstreamError::AlreadyExists) => StatusCode::CONFLICT,
            GatewayError::Upstream(UpstreamError::Permission(_)) => StatusCode::BAD_GATEWAY,
            GatewayError::Upstream(UpstreamError::Transient(_)) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream(UpstreamError::Rejected(_)) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let GatewayError::Internal(ref err) = self {
            tracing::error!("internal error: {err:#}");
        }

        let body = json!({
            "message": self.to_string(),
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
