//! Security Error Types
//!
//! This module provides security-specific error variants that integrate
//! with the unified `kernel::error::AppError` system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::headers::ResponseHeaderError;
use platform::password::PasswordHashError;
use platform::rate_limit::{RateLimitDecision, RateLimitStoreError};
use thiserror::Error;

/// Security-specific result type alias
pub type SecurityResult<T> = Result<T, SecurityError>;

/// How a failed request must be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The client may retry or correct the request
    Rejected,
    /// The request must be aborted
    Fatal,
}

/// Security-specific error variants
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Session fingerprint mismatch; the session has been destroyed
    #[error("The fingerprint supplied is invalid")]
    Integrity,

    /// Operation requires an active session
    #[error("There is no active session")]
    SessionNotActive,

    #[error("No token was supplied")]
    MissingToken,

    #[error("No token was ever stored")]
    NoStoredToken,

    #[error("The token supplied is invalid")]
    InvalidToken,

    /// Token was issued for a different URI
    #[error("The token was issued for a different origin")]
    OriginMismatch,

    /// Caller passed input the operation cannot accept
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Rate limit exhausted; carries the decision for retry metadata
    #[error("Too many requests have been made to the server")]
    RateLimitExceeded { decision: RateLimitDecision },

    #[error("Headers already sent")]
    HeadersAlreadySent,

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Session or rate-limit backend failure
    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SecurityError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            SecurityError::MissingToken | SecurityError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            SecurityError::Integrity
            | SecurityError::SessionNotActive
            | SecurityError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            SecurityError::NoStoredToken
            | SecurityError::InvalidToken
            | SecurityError::OriginMismatch => StatusCode::FORBIDDEN,
            SecurityError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            SecurityError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            SecurityError::HeadersAlreadySent
            | SecurityError::Config(_)
            | SecurityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SecurityError::MissingToken | SecurityError::InvalidInput(_) => ErrorKind::BadRequest,
            SecurityError::Integrity
            | SecurityError::SessionNotActive
            | SecurityError::InvalidCredentials => ErrorKind::Unauthorized,
            SecurityError::NoStoredToken
            | SecurityError::InvalidToken
            | SecurityError::OriginMismatch => ErrorKind::Forbidden,
            SecurityError::RateLimitExceeded { .. } => ErrorKind::TooManyRequests,
            SecurityError::Store(_) => ErrorKind::ServiceUnavailable,
            SecurityError::HeadersAlreadySent
            | SecurityError::Config(_)
            | SecurityError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            SecurityError::RateLimitExceeded { .. } | SecurityError::InvalidCredentials => {
                Disposition::Rejected
            }
            _ => Disposition::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.disposition() == Disposition::Fatal
    }

    /// Convert to AppError
    ///
    /// Rate-limit rejections keep their `X-RateLimit-*` headers.
    pub fn to_app_error(&self) -> AppError {
        let err = AppError::new(self.kind(), self.to_string());
        match self {
            SecurityError::RateLimitExceeded { decision } => decision
                .headers()
                .into_iter()
                .fold(err, |err, (name, value)| err.with_header(name, value))
                .with_action("Wait until the retry time before sending another request"),
            SecurityError::Integrity => err.with_action("Sign in again"),
            SecurityError::NoStoredToken
            | SecurityError::InvalidToken
            | SecurityError::OriginMismatch => {
                err.with_action("Reload the form and submit it again")
            }
            _ => err,
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            SecurityError::Store(msg) => {
                tracing::error!(message = %msg, "Security store error");
            }
            SecurityError::Internal(msg) | SecurityError::Config(msg) => {
                tracing::error!(message = %msg, "Security internal error");
            }
            SecurityError::HeadersAlreadySent => {
                tracing::error!("Attempted to modify headers after they were sent");
            }
            SecurityError::Integrity => {
                tracing::warn!("Session fingerprint mismatch detected");
            }
            SecurityError::InvalidToken
            | SecurityError::OriginMismatch
            | SecurityError::NoStoredToken => {
                tracing::warn!(error = %self, "CSRF verification failed");
            }
            SecurityError::RateLimitExceeded { decision } => {
                tracing::warn!(
                    retry_after = decision.retry_after,
                    limit = decision.limit,
                    "Rate limit exceeded"
                );
            }
            SecurityError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            _ => {
                tracing::debug!(error = %self, "Security error");
            }
        }
    }
}

impl IntoResponse for SecurityError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<PasswordHashError> for SecurityError {
    fn from(err: PasswordHashError) -> Self {
        match err {
            PasswordHashError::InvalidInput(reason) => {
                SecurityError::InvalidInput(reason.to_string())
            }
            PasswordHashError::InvalidConfig(reason) => SecurityError::Config(reason),
            other => SecurityError::Internal(other.to_string()),
        }
    }
}

impl From<RateLimitStoreError> for SecurityError {
    fn from(err: RateLimitStoreError) -> Self {
        let message = err.to_string();
        match err {
            RateLimitStoreError::ExceedsLimit { .. } => SecurityError::InvalidInput(message),
            RateLimitStoreError::InvalidConfig(reason) => SecurityError::Config(reason),
            RateLimitStoreError::Unavailable(reason) => SecurityError::Store(reason),
        }
    }
}

impl From<ResponseHeaderError> for SecurityError {
    fn from(err: ResponseHeaderError) -> Self {
        match err {
            ResponseHeaderError::HeadersAlreadySent => SecurityError::HeadersAlreadySent,
            other => SecurityError::Internal(other.to_string()),
        }
    }
}

impl From<AppError> for SecurityError {
    fn from(err: AppError) -> Self {
        SecurityError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected_decision() -> RateLimitDecision {
        RateLimitDecision {
            accepted: false,
            remaining_tokens: 0,
            retry_after: 1_700_000_060,
            limit: 5,
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(SecurityError::MissingToken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(SecurityError::InvalidToken.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(SecurityError::OriginMismatch.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(SecurityError::Integrity.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            SecurityError::RateLimitExceeded {
                decision: rejected_decision()
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            SecurityError::HeadersAlreadySent.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_status_code_matches_kind() {
        let errors = [
            SecurityError::Integrity,
            SecurityError::SessionNotActive,
            SecurityError::MissingToken,
            SecurityError::NoStoredToken,
            SecurityError::InvalidToken,
            SecurityError::OriginMismatch,
            SecurityError::InvalidInput("x".into()),
            SecurityError::InvalidCredentials,
            SecurityError::HeadersAlreadySent,
            SecurityError::Config("x".into()),
            SecurityError::Store("x".into()),
            SecurityError::Internal("x".into()),
        ];
        for err in errors {
            assert_eq!(err.status_code().as_u16(), err.kind().status_code(), "{err}");
        }
    }

    #[test]
    fn test_disposition() {
        let limited = SecurityError::RateLimitExceeded {
            decision: rejected_decision(),
        };
        assert_eq!(limited.disposition(), Disposition::Rejected);
        assert!(SecurityError::Integrity.is_fatal());
        assert!(SecurityError::InvalidToken.is_fatal());
        assert!(SecurityError::HeadersAlreadySent.is_fatal());
    }

    #[test]
    fn test_rate_limit_app_error_carries_headers() {
        let err = SecurityError::RateLimitExceeded {
            decision: rejected_decision(),
        }
        .to_app_error();

        assert_eq!(err.status_code(), 429);
        let headers = err.headers();
        assert!(headers.contains(&("X-RateLimit-Remaining", "0".to_string())));
        assert!(headers.contains(&("X-RateLimit-Retry-After", "1700000060".to_string())));
        assert!(headers.contains(&("X-RateLimit-Limit", "5".to_string())));
    }

    #[test]
    fn test_into_response_status() {
        let response = SecurityError::OriginMismatch.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = SecurityError::RateLimitExceeded {
            decision: rejected_decision(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("x-ratelimit-remaining").unwrap(),
            "0"
        );
    }

    #[test]
    fn test_conversions() {
        let err: SecurityError = PasswordHashError::InvalidInput("too long").into();
        assert!(matches!(err, SecurityError::InvalidInput(_)));

        let err: SecurityError = RateLimitStoreError::Unavailable("down".into()).into();
        assert!(matches!(err, SecurityError::Store(_)));

        let err: SecurityError = ResponseHeaderError::HeadersAlreadySent.into();
        assert!(matches!(err, SecurityError::HeadersAlreadySent));
    }
}
