//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-address token bucket)
//!     → authentication.rs (bearer token → identity)
//!     → authorization.rs (authenticated → activated → permitted gates)
//!     → Route handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: a missing peer address or store failure rejects the
//!   request, never bypasses a check
//! - One identity per request, attached once, immutable afterwards
//! - Gate order is fixed by construction and cannot be bypassed

pub mod authentication;
pub mod authorization;
pub mod rate_limit;

pub use authentication::{request_identity, Identity};
pub use rate_limit::{ClientRegistry, Decision};
