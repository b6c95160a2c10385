//! Metrics collection and exposition.
//!
//! Counters go through the `metrics` facade; the Prometheus exporter owns
//! its own listener and is installed once at startup when enabled.

use std::net::SocketAddr;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    if let Err(err) = builder.install() {
        tracing::error!(error = %err, "failed to install Prometheus exporter");
        return;
    }

    describe_counter!("api_requests_total", "Total requests by method and status");
    describe_counter!(
        "api_rate_limited_total",
        "Requests rejected by the rate limiter"
    );

    tracing::info!(address = %addr, "metrics exporter listening");
}

/// Count one completed request.
pub fn record_request(method: &str, status: u16) {
    counter!(
        "api_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Count one rate-limit denial.
pub fn record_rate_limited() {
    counter!("api_rate_limited_total").increment(1);
}

/// Middleware recording request counts by method and response status.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let response = next.run(request).await;
    record_request(&method, response.status().as_u16());
    response
}
