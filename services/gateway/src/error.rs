//! Gateway error taxonomy.
//!
//! Backend and network failures are never surfaced raw to clients: every
//! variant that reaches the wire renders as a stable `{"error": "..."}`
//! JSON body. Upstream failures carry the failing service so operators can
//! tell which dependency is down from logs alone.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use storefront_discovery::DiscoveryError;
use thiserror::Error;

/// Errors surfaced by the gateway request pipeline and startup path.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No configured route prefix matches the request path.
    #[error("no route matches the request path")]
    RouteNotFound,

    /// The selector found no healthy instance for the target service.
    #[error("no healthy instance of {service}")]
    UpstreamUnavailable { service: String },

    /// The selected instance did not answer within the per-request timeout.
    #[error("upstream {service} at {instance} timed out")]
    UpstreamTimeout { service: String, instance: String },

    /// The connection to the selected instance failed.
    #[error("upstream {service} at {instance} failed: {reason}")]
    UpstreamConnectionFailed {
        service: String,
        instance: String,
        reason: String,
    },

    /// The client exceeded its request ceiling for the current window.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Registering with the discovery backend failed. Non-fatal: the
    /// gateway keeps serving, invisible to discovery-aware clients.
    #[error("registration failed: {0}")]
    RegistrationFailed(#[from] DiscoveryError),

    /// Startup configuration is malformed. Fatal: the gateway must not
    /// start with a route table it cannot trust.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl GatewayError {
    /// HTTP status for the client-facing rendering.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::UpstreamUnavailable { .. }
            | GatewayError::UpstreamTimeout { .. }
            | GatewayError::UpstreamConnectionFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RegistrationFailed(_) | GatewayError::ConfigInvalid(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable client-facing message. Never leaks transport detail.
    fn client_message(&self) -> String {
        match self {
            GatewayError::RouteNotFound => "route not found".to_string(),
            GatewayError::UpstreamUnavailable { service }
            | GatewayError::UpstreamTimeout { service, .. }
            | GatewayError::UpstreamConnectionFailed { service, .. } => {
                format!("{service} unavailable")
            }
            GatewayError::RateLimited => "rate limit exceeded".to_string(),
            GatewayError::RegistrationFailed(_) | GatewayError::ConfigInvalid(_) => {
                "internal error".to_string()
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.client_message() }))).into_response()
    }
}
