//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight requests
//!     → Drain background tasks → Report terminal outcome
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listener drain is bounded by a fixed deadline; background-task drain
//!   is not (the listener deadline already bounds total wall time in the
//!   common case)
//! - A listener error before any signal is fatal and skips the drain
//! - The terminal result is produced exactly once

pub mod shutdown;
pub mod signals;

pub use shutdown::{ShutdownCoordinator, ShutdownError, ShutdownHandle, ShutdownState};
