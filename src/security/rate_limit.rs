//! Per-client rate limiting middleware.
//!
//! Each client address owns a token bucket, refilled lazily at check time.
//! A background sweep evicts addresses idle for longer than the eviction
//! window so the registry cannot grow without bound. Identity is the
//! transport peer address: stable per connection origin, shared by clients
//! behind one NAT or proxy.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::LimiterConfig;
use crate::http::error::ApiError;
use crate::observability::metrics;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const EVICTION_WINDOW: Duration = Duration::from_secs(3 * 60);

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Process-wide registry mapping client addresses to token buckets.
pub struct ClientRegistry {
    clients: Mutex<HashMap<IpAddr, ClientEntry>>,
    enabled: bool,
    rps: f64,
    burst: f64,
}

impl ClientRegistry {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            enabled: config.enabled,
            rps: config.rps,
            burst: config.burst as f64,
        }
    }

    /// Check whether a request from `ip` is admitted right now.
    pub fn check(&self, ip: IpAddr) -> Decision {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Decision {
        if !self.enabled {
            return Decision::Allowed;
        }

        let mut clients = self.clients.lock().expect("client registry mutex poisoned");
        let entry = clients
            .entry(ip)
            .or_insert_with(|| ClientEntry {
                bucket: TokenBucket::new(self.burst, now),
                last_seen: now,
            });
        entry.last_seen = now;

        if entry.bucket.try_acquire(self.burst, self.rps, now) {
            Decision::Allowed
        } else {
            Decision::Denied
        }
    }

    /// Evict clients not seen within the eviction window.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        let mut clients = self.clients.lock().expect("client registry mutex poisoned");
        clients.retain(|_, entry| now.duration_since(entry.last_seen) <= EVICTION_WINDOW);
    }

    /// Number of addresses currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().expect("client registry mutex poisoned").len()
    }

    /// Start the periodic eviction sweep. Long-lived; runs until the
    /// process exits.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                registry.sweep();
            }
        });
    }
}

/// Middleware enforcing the per-client limit ahead of everything except
/// panic recovery.
pub async fn rate_limit_middleware(
    State(registry): State<Arc<ClientRegistry>>,
    request: Request,
    next: Next,
) -> Response {
    // the peer address comes pre-parsed from the transport layer; its
    // absence means the server was wired without connect info, which must
    // fail the request rather than bypass the limiter
    let Some(ConnectInfo(addr)) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .copied()
    else {
        return ApiError::Internal("peer address missing from request".to_string()).into_response();
    };

    match registry.check(addr.ip()) {
        Decision::Allowed => next.run(request).await,
        Decision::Denied => {
            tracing::warn!(client = %addr.ip(), "rate limit exceeded");
            metrics::record_rate_limited();
            ApiError::RateLimited.into_response()
        }
    }
}
