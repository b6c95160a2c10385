//! Movie catalog JSON API.
//!
//! The interesting part of this crate is the concurrent request-processing
//! core that every request passes through before its handler runs:
//!
//! ```text
//!     Client Request
//!     ──────────────▶ panic recovery ─▶ rate limiter ─▶ CORS ─▶ authentication
//!                                                                     │
//!                                                                     ▼
//!                                          authorization gates ─▶ handler
//! ```
//!
//! Orthogonal to the request path, a [`tasks::TaskTracker`] owns all
//! fire-and-forget background work and a
//! [`lifecycle::ShutdownCoordinator`] drives signal-driven graceful
//! shutdown: stop accepting, drain in-flight requests within a deadline,
//! drain background tasks, report a single terminal outcome.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;
pub mod tasks;

pub use config::Config;
pub use http::{ApiError, ApiServer};
pub use lifecycle::{ShutdownCoordinator, ShutdownError, ShutdownHandle, ShutdownState};
pub use tasks::TaskTracker;
