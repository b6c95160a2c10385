//! Bearer-token authentication.
//!
//! Resolves the `Authorization` header to a request identity and attaches
//! it as a request extension, exactly once per request. A missing header is
//! not an error (the request proceeds anonymously); a malformed one is.
//! Tokens are syntax-checked before any store lookup, and a lookup miss is
//! reported identically to an expired token.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::http::error::ApiError;
use crate::store::{TokenScope, User, UserStore, TOKEN_ALPHABET};

/// Length of a token plaintext.
pub const TOKEN_LENGTH: usize = 26;

/// The identity attached to every request after authentication runs.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::User(user) => Some(user),
            Identity::Anonymous => None,
        }
    }
}

/// Read the identity attached by the authentication middleware.
///
/// # Panics
///
/// Panics if authentication has not run for this request. That is a
/// middleware-ordering bug, not a request-time condition.
pub fn request_identity(request: &Request) -> &Identity {
    request
        .extensions()
        .get::<Identity>()
        .expect("identity read before the authentication middleware ran")
}

/// Syntactic check applied before any store round trip.
pub fn token_is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.bytes().all(|b| TOKEN_ALPHABET.contains(&b))
}

/// Middleware resolving the bearer credential to an [`Identity`].
///
/// Every response, success or failure, carries `Vary: Authorization` so
/// caches never conflate responses across differing credentials.
pub async fn authenticate_middleware(
    State(users): State<Arc<dyn UserStore>>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut response = match resolve(users.as_ref(), request.headers()) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    };
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

fn resolve(users: &dyn UserStore, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Identity::Anonymous);
    };

    let value = value.to_str().map_err(|_| ApiError::MalformedCredentials)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(ApiError::MalformedCredentials)?;
    if token.is_empty() || token.contains(' ') {
        return Err(ApiError::MalformedCredentials);
    }

    if !token_is_well_formed(token) {
        return Err(ApiError::InvalidToken);
    }

    match users.user_for_token(TokenScope::Authentication, token) {
        Ok(Some(user)) => Ok(Identity::User(user)),
        Ok(None) => Err(ApiError::InvalidToken),
        Err(err) => Err(ApiError::Internal(err.to_string())),
    }
}
