//! Gateway configuration (env-driven).
//!
//! Invalid values abort startup. The route table in particular is
//! fail-fast: a gateway with a route table it cannot trust must not serve.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::GatewayError;
use crate::routes::Route;

/// Default route table for the storefront deployment.
pub const DEFAULT_ROUTES: &str = "/api/auth=auth-service,\
                                  /api/products=product-service,\
                                  /api/appointments=appointment-service,\
                                  /api/orders=order-service,\
                                  /api/contact=contact-service";

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP listener binds to.
    pub listen_addr: SocketAddr,

    /// Address registered with the discovery backend (defaults to the
    /// listen address).
    pub advertise_addr: SocketAddr,

    /// Discovery agent base URL (example: http://localhost:8500).
    pub discovery_url: String,

    /// Static routes, parsed from `GATEWAY_ROUTES`.
    pub routes: Vec<Route>,

    /// CORS allow-list. Origins not in the list get no CORS headers.
    pub allowed_origins: Vec<String>,

    /// Requests allowed per client key per window.
    pub rate_limit_max: u64,

    /// Fixed rate-limit window length.
    pub rate_limit_window: Duration,

    /// Per-request upstream timeout.
    pub upstream_timeout: Duration,

    /// How often the discovery cache is refreshed.
    pub discovery_refresh: Duration,

    /// How long a cached discovery snapshot stays servable after the
    /// backend stops answering.
    pub discovery_stale: Duration,

    /// Interval, in seconds, the discovery backend probes our health URL.
    pub check_interval_secs: u64,

    /// Grace period for draining in-flight requests at shutdown.
    pub shutdown_grace: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr: SocketAddr = std::env::var("GATEWAY_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("GATEWAY_LISTEN_ADDR must be a socket address.")?;

        let advertise_addr: SocketAddr = match std::env::var("GATEWAY_ADVERTISE_ADDR") {
            Ok(raw) => raw
                .parse()
                .context("GATEWAY_ADVERTISE_ADDR must be a socket address.")?,
            Err(_) => listen_addr,
        };

        let discovery_url = std::env::var("GATEWAY_DISCOVERY_URL")
            .unwrap_or_else(|_| "http://localhost:8500".to_string());

        let raw_routes =
            std::env::var("GATEWAY_ROUTES").unwrap_or_else(|_| DEFAULT_ROUTES.to_string());
        let routes = parse_routes(&raw_routes)?;

        let allowed_origins = std::env::var("GATEWAY_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let rate_limit_max: u64 = std::env::var("GATEWAY_RATE_LIMIT_MAX")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GATEWAY_RATE_LIMIT_MAX must be an integer.")?
            .unwrap_or(100)
            .max(1);

        let rate_limit_window_ms: u64 = std::env::var("GATEWAY_RATE_LIMIT_WINDOW_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GATEWAY_RATE_LIMIT_WINDOW_MS must be an integer (milliseconds).")?
            .unwrap_or(60_000)
            .max(100);

        let upstream_timeout_ms: u64 = std::env::var("GATEWAY_UPSTREAM_TIMEOUT_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GATEWAY_UPSTREAM_TIMEOUT_MS must be an integer (milliseconds).")?
            .unwrap_or(10_000)
            .max(100);

        let discovery_refresh_ms: u64 = std::env::var("GATEWAY_DISCOVERY_REFRESH_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GATEWAY_DISCOVERY_REFRESH_MS must be an integer (milliseconds).")?
            .unwrap_or(10_000)
            .max(50);

        let discovery_stale_ms: u64 = std::env::var("GATEWAY_DISCOVERY_STALE_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GATEWAY_DISCOVERY_STALE_MS must be an integer (milliseconds).")?
            .unwrap_or(30_000)
            .max(discovery_refresh_ms);

        let check_interval_secs: u64 = std::env::var("GATEWAY_DISCOVERY_CHECK_INTERVAL_S")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GATEWAY_DISCOVERY_CHECK_INTERVAL_S must be an integer (seconds).")?
            .unwrap_or(10)
            .clamp(1, 300);

        let shutdown_grace_ms: u64 = std::env::var("GATEWAY_SHUTDOWN_GRACE_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("GATEWAY_SHUTDOWN_GRACE_MS must be an integer (milliseconds).")?
            .unwrap_or(10_000);

        let log_level = std::env::var("GATEWAY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            listen_addr,
            advertise_addr,
            discovery_url,
            routes,
            allowed_origins,
            rate_limit_max,
            rate_limit_window: Duration::from_millis(rate_limit_window_ms),
            upstream_timeout: Duration::from_millis(upstream_timeout_ms),
            discovery_refresh: Duration::from_millis(discovery_refresh_ms),
            discovery_stale: Duration::from_millis(discovery_stale_ms),
            check_interval_secs,
            shutdown_grace: Duration::from_millis(shutdown_grace_ms),
            log_level,
        })
    }

    /// URL the discovery backend probes for gateway liveness.
    pub fn health_check_url(&self) -> String {
        format!("http://{}/health", self.advertise_addr)
    }
}

/// Parse a `GATEWAY_ROUTES` value: comma-separated `prefix=service`
/// entries, with an optional `:keep-prefix` suffix to forward the path
/// unmodified.
pub fn parse_routes(raw: &str) -> Result<Vec<Route>, GatewayError> {
    let mut routes = Vec::new();

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (prefix, target) = entry.split_once('=').ok_or_else(|| {
            GatewayError::ConfigInvalid(format!("route entry '{entry}' must be 'prefix=service'"))
        })?;

        let (service, strip_prefix) = match target.split_once(':') {
            Some((service, "keep-prefix")) => (service, false),
            Some((_, flag)) => {
                return Err(GatewayError::ConfigInvalid(format!(
                    "unknown route flag '{flag}' in '{entry}'"
                )));
            }
            None => (target, true),
        };

        routes.push(Route {
            prefix: prefix.trim().to_string(),
            service: service.trim().to_string(),
            strip_prefix,
        });
    }

    Ok(routes)
}
