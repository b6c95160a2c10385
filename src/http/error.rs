//! Request-level error taxonomy.
//!
//! Every rejection produced by the middleware stack or a handler is one of
//! these variants, rendered as a JSON envelope with a stable machine code
//! and a human-readable message. Internal errors are logged with full
//! detail but only a generic message is sent to the client.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "RATE_LIMITED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Errors surfaced to clients by the request-processing core.
///
/// A missing `Authorization` header is deliberately not represented here:
/// it routes the request to the anonymous identity instead of failing.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Client exceeded its per-address rate limit (429).
    #[error("rate limit exceeded")]
    RateLimited,

    /// Authorization header present but not of the form `Bearer <token>` (401).
    #[error("invalid authentication credentials")]
    MalformedCredentials,

    /// Token is syntactically invalid, unknown, or expired (401).
    #[error("invalid or expired authentication token")]
    InvalidToken,

    /// An anonymous request reached a protected resource (401).
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    /// Authenticated but not activated (403).
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,

    /// Activated but lacking the required permission (403).
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,

    /// Resource does not exist (404).
    #[error("the requested resource could not be found")]
    NotFound,

    /// Version mismatch on an optimistic-concurrency update (409).
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// Request body failed validation (422).
    #[error("{0}")]
    Validation(String),

    /// Something went wrong inside the server (500). The payload is logged,
    /// never returned to the client.
    #[error("the server encountered a problem and could not process your request")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::MalformedCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            Self::AuthenticationRequired => (StatusCode::UNAUTHORIZED, "AUTHENTICATION_REQUIRED"),
            Self::InactiveAccount => (StatusCode::FORBIDDEN, "INACTIVE_ACCOUNT"),
            Self::NotPermitted => (StatusCode::FORBIDDEN, "NOT_PERMITTED"),
            Self::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::EditConflict => (StatusCode::CONFLICT, "EDIT_CONFLICT"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Whether the response should carry a `WWW-Authenticate: Bearer` challenge.
    fn is_token_challenge(&self) -> bool {
        matches!(self, Self::MalformedCredentials | Self::InvalidToken)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(detail = %detail, "internal server error");
        }

        let (status, code) = self.status_and_code();
        let challenge = self.is_token_challenge();
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::EditConflict => Self::EditConflict,
            StoreError::DuplicateEmail => {
                Self::Validation("a user with this email address already exists".to_string())
            }
            StoreError::Unavailable(detail) => Self::Internal(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(
            ApiError::RateLimited.status_and_code().0,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::MalformedCredentials.status_and_code().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InactiveAccount.status_and_code().0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotPermitted.status_and_code().0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status_and_code().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn token_failures_carry_bearer_challenge() {
        assert!(ApiError::InvalidToken.is_token_challenge());
        assert!(ApiError::MalformedCredentials.is_token_challenge());
        assert!(!ApiError::AuthenticationRequired.is_token_challenge());
    }
}
