//! Layered authorization gates.
//!
//! Three gates wrap protected routes: authenticated → activated →
//! permitted. The composition helpers below always stack the weaker gates
//! outside the stronger ones, so a permission check can never be reached by
//! an anonymous or deactivated identity. No gate mutates shared state; the
//! permission gate performs the single external lookup.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::http::error::ApiError;
use crate::security::authentication::{request_identity, Identity};
use crate::store::UserStore;

/// Reject anonymous requests.
pub fn require_authenticated<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn(authenticated_gate))
}

/// Reject anonymous and not-yet-activated users.
pub fn require_activated<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    require_authenticated(router.route_layer(middleware::from_fn(activated_gate)))
}

/// Reject users whose permission set does not include `code`. Implies the
/// activated and authenticated gates.
pub fn require_permission<S>(
    router: Router<S>,
    code: &'static str,
    users: Arc<dyn UserStore>,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    require_activated(router.route_layer(middleware::from_fn_with_state(
        PermissionGate { users, code },
        permission_gate,
    )))
}

#[derive(Clone)]
struct PermissionGate {
    users: Arc<dyn UserStore>,
    code: &'static str,
}

async fn authenticated_gate(request: Request, next: Next) -> Response {
    if request_identity(&request).is_anonymous() {
        return ApiError::AuthenticationRequired.into_response();
    }
    next.run(request).await
}

async fn activated_gate(request: Request, next: Next) -> Response {
    let rejection = match request_identity(&request) {
        Identity::Anonymous => Some(ApiError::AuthenticationRequired),
        Identity::User(user) if !user.activated => Some(ApiError::InactiveAccount),
        Identity::User(_) => None,
    };
    match rejection {
        Some(err) => err.into_response(),
        None => next.run(request).await,
    }
}

async fn permission_gate(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Response {
    // the outer gates guarantee an activated user here
    let Some(user) = request_identity(&request).user().cloned() else {
        return ApiError::AuthenticationRequired.into_response();
    };

    let permissions = match gate.users.permissions_for(user.id) {
        Ok(permissions) => permissions,
        Err(err) => return ApiError::Internal(err.to_string()).into_response(),
    };

    if !permissions.iter().any(|p| p == gate.code) {
        return ApiError::NotPermitted.into_response();
    }
    next.run(request).await
}
