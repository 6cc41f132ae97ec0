//! HTTP surface wiring: routes, middleware stack, shared state.

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::health;
use crate::middleware::cors;
use crate::middleware::rate_limit::{self, RateLimiter};
use crate::proxy;
use crate::routes::RouteTable;
use crate::selector::UpstreamSelector;

/// Shared state injected into every handler and middleware via
/// [`axum::extract::State`].
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub selector: Arc<UpstreamSelector>,
    pub rate_limiter: Arc<RateLimiter>,
    pub http: reqwest::Client,
    pub upstream_timeout: Duration,
}

/// Create the gateway router with all routes and middleware.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Result<Router, GatewayError> {
    let cors = cors::cors_layer(allowed_origins)?;

    // Only proxied traffic is rate limited; the health endpoint must stay
    // answerable for the discovery backend's own probes.
    let proxied = Router::new()
        .fallback(proxy::forward)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ));

    Ok(Router::new()
        .route("/health", get(health::health))
        .merge(proxied)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Application state
        .with_state(state))
}
