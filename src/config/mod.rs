//! Runtime configuration.
//!
//! All settings are supplied as command-line flags. Defaults are
//! development-friendly: rate limiting on at 2 rps / burst 4, no trusted
//! CORS origins, metrics exporter off.

use clap::{Args, Parser};

/// Top-level configuration for the API server.
#[derive(Debug, Clone, Parser)]
#[command(name = "marquee", version, about = "Movie catalog JSON API")]
pub struct Config {
    /// API server port.
    #[arg(long, default_value_t = 4000)]
    pub port: u16,

    /// Environment (development|staging|production).
    #[arg(long, default_value = "development")]
    pub env: String,

    #[command(flatten)]
    pub limiter: LimiterConfig,

    #[command(flatten)]
    pub cors: CorsConfig,

    #[command(flatten)]
    pub observability: ObservabilityConfig,
}

/// Per-client rate limiter settings.
#[derive(Debug, Clone, Args)]
pub struct LimiterConfig {
    /// Rate limiter sustained requests per second, per client.
    #[arg(long = "limiter-rps", default_value_t = 2.0)]
    pub rps: f64,

    /// Rate limiter maximum burst, per client.
    #[arg(long = "limiter-burst", default_value_t = 4)]
    pub burst: u32,

    /// Enable the rate limiter.
    #[arg(long = "limiter-enabled", default_value_t = true, action = clap::ArgAction::Set)]
    pub enabled: bool,
}

/// Cross-origin request settings.
#[derive(Debug, Clone, Default, Args)]
pub struct CorsConfig {
    /// Trusted CORS origins (space separated).
    #[arg(long = "cors-trusted-origins", value_delimiter = ' ', num_args = 0..)]
    pub trusted_origins: Vec<String>,
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Args)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics endpoint.
    #[arg(long = "metrics-enabled", default_value_t = false)]
    pub metrics_enabled: bool,

    /// Metrics listen address.
    #[arg(long = "metrics-address", default_value = "127.0.0.1:9100")]
    pub metrics_address: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            env: "development".to_string(),
            limiter: LimiterConfig::default(),
            cors: CorsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rps: 2.0,
            burst: 4,
            enabled: true,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9100".to_string(),
        }
    }
}
