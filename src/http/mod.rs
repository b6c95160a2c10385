//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → server.rs (router, middleware order)
//!     → security (rate limit, authentication, authorization gates)
//!     → handlers.rs (thin store translations)
//!     → error.rs (uniform JSON error envelope)
//! ```

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{ApiServer, AppState};
