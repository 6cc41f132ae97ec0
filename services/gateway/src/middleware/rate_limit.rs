//! Fixed-window rate limiting per client key.
//!
//! Each client key gets `max_requests` requests per window; the counter
//! resets when the window expires. Counting is atomic per key, so
//! concurrent requests for the same key never undercount. Exceeding the
//! ceiling yields `429` without forwarding.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::server::AppState;

struct RateLimitWindow {
    count: u64,
    window_start: Instant,
}

/// Per-client fixed-window request limiter.
pub struct RateLimiter {
    windows: DashMap<String, RateLimitWindow>,
    max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    /// * `max_requests` - allowed requests per window
    /// * `window`       - window duration
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    /// Window duration, for the sweep loop's cadence.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a request from `client_key`; `true` means it may proceed.
    pub fn check(&self, client_key: &str) -> bool {
        let now = Instant::now();

        let mut entry = self
            .windows
            .entry(client_key.to_string())
            .or_insert_with(|| RateLimitWindow {
                count: 0,
                window_start: now,
            });

        // Roll the window if it has expired.
        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            true
        } else {
            false
        }
    }

    /// Evict expired windows so the map stays bounded by active clients.
    pub fn sweep(&self) {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.duration_since(window.window_start) < self.window * 2);
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, "Swept expired rate-limit windows");
        }
    }
}

/// Run the periodic window sweep until shutdown.
pub async fn run_sweep_loop(limiter: Arc<RateLimiter>, mut shutdown: watch::Receiver<bool>) {
    let mut interval_timer = tokio::time::interval(limiter.window());

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                limiter.sweep();
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Rate-limit sweep loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Axum middleware enforcing the limiter ahead of the proxy engine.
pub async fn enforce(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = client_key(&req);

    if state.rate_limiter.check(&key) {
        next.run(req).await
    } else {
        debug!(client_key = %key, "Request rejected by rate limiter");
        GatewayError::RateLimited.into_response()
    }
}

/// Client key for rate limiting: first `X-Forwarded-For` entry when
/// present (the gateway is the single edge, so the header is only trusted
/// from the immediate hop), else the peer address.
fn client_key(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
