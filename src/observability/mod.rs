//! Observability subsystem.
//!
//! Structured logging uses `tracing`, initialized in `main`. Metrics use
//! the `metrics` facade with an optional Prometheus exporter; see
//! [`metrics::init_metrics`].

pub mod metrics;
