//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with all routes and authorization gates
//! - Wire the fixed middleware order: panic recovery → rate limiter →
//!   CORS → authentication (request ID, tracing, and metrics sit outside)
//! - Run the serve loop under the shutdown coordinator

use std::any::Any;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Response, StatusCode};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, CorsConfig};
use crate::http::error::{ErrorBody, ErrorDetail};
use crate::http::handlers;
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownError, ShutdownHandle};
use crate::observability::metrics;
use crate::security::authentication::authenticate_middleware;
use crate::security::authorization::require_permission;
use crate::security::rate_limit::{rate_limit_middleware, ClientRegistry};
use crate::store::{Mailer, MovieStore, UserStore};
use crate::tasks::{panic_message, TaskTracker};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub env: String,
    pub users: Arc<dyn UserStore>,
    pub movies: Arc<dyn MovieStore>,
    pub mailer: Arc<dyn Mailer>,
    pub tasks: TaskTracker,
}

/// The API server: router, limiter, task tracker, and shutdown coordinator.
pub struct ApiServer {
    router: Router,
    config: Config,
    limiter: Arc<ClientRegistry>,
    tasks: TaskTracker,
    coordinator: ShutdownCoordinator,
}

impl ApiServer {
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        movies: Arc<dyn MovieStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let limiter = Arc::new(ClientRegistry::new(&config.limiter));
        let tasks = TaskTracker::new();
        let coordinator = ShutdownCoordinator::new(tasks.clone());

        let state = AppState {
            env: config.env.clone(),
            users,
            movies,
            mailer,
            tasks: tasks.clone(),
        };
        let router = Self::build_router(&config, state, limiter.clone());

        Self {
            router,
            config,
            limiter,
            tasks,
            coordinator,
        }
    }

    fn build_router(config: &Config, state: AppState, limiter: Arc<ClientRegistry>) -> Router {
        let open = Router::new()
            .route("/v1/healthcheck", get(handlers::healthcheck))
            .route("/v1/users", post(handlers::register_user))
            .route("/v1/users/activated", put(handlers::activate_user))
            .route(
                "/v1/tokens/authentication",
                post(handlers::create_authentication_token),
            );

        let catalog_read = require_permission(
            Router::new()
                .route("/v1/movies", get(handlers::list_movies))
                .route("/v1/movies/{id}", get(handlers::show_movie)),
            "movies:read",
            state.users.clone(),
        );

        let catalog_write = require_permission(
            Router::new()
                .route("/v1/movies", post(handlers::create_movie))
                .route(
                    "/v1/movies/{id}",
                    patch(handlers::update_movie).delete(handlers::delete_movie),
                ),
            "movies:write",
            state.users.clone(),
        );

        let users = state.users.clone();
        open.merge(catalog_read)
            .merge(catalog_write)
            .with_state(state)
            .layer(
                // outermost first; the core order is fixed: panic recovery,
                // rate limiter, CORS, authentication
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn(metrics::track_requests))
                    .layer(CatchPanicLayer::custom(recovered_panic_response))
                    .layer(middleware::from_fn_with_state(
                        limiter,
                        rate_limit_middleware,
                    ))
                    .layer(cors_layer(&config.cors))
                    .layer(middleware::from_fn_with_state(
                        users,
                        authenticate_middleware,
                    )),
            )
    }

    /// Handle for starting a drain without an OS signal.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.coordinator.handle()
    }

    /// The server's background task tracker.
    pub fn tasks(&self) -> TaskTracker {
        self.tasks.clone()
    }

    /// Run the server until it drains or fails. The returned result is the
    /// single terminal outcome of the shutdown sequence.
    pub async fn run(self, listener: TcpListener) -> Result<(), ShutdownError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = %self.config.env,
            limiter_enabled = self.config.limiter.enabled,
            "starting server"
        );

        self.limiter.spawn_sweeper();

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(self.coordinator.drain_signal());

        self.coordinator.run(serve.into_future()).await?;

        tracing::info!(address = %addr, "stopped server");
        Ok(())
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .trusted_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Convert a recovered handler panic into a 500 envelope. `Connection:
/// close` tells the client not to reuse a potentially corrupted connection.
fn recovered_panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    tracing::error!(
        error = %panic_message(panic.as_ref()),
        "recovered panic while handling request"
    );

    let body = ErrorBody {
        error: ErrorDetail {
            code: "INTERNAL_ERROR".to_string(),
            message: "the server encountered a problem and could not process your request"
                .to_string(),
        },
    };
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    async fn boom() {
        panic!("handler blew up");
    }

    #[tokio::test]
    async fn recovered_panic_yields_500_and_connection_close() {
        let app: Router = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(recovered_panic_response));

        let response = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONNECTION),
            Some(&HeaderValue::from_static("close"))
        );

        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    }
}
