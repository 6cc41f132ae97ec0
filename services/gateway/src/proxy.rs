//! Proxy engine: the request pipeline behind the policy middleware.
//!
//! Pipeline per request, strictly in order: resolve route → select
//! upstream → forward → relay (or translate the failure). Bodies stream in
//! both directions, so large payloads are never buffered and upstream
//! backpressure propagates to the inbound connection. If the client
//! disconnects mid-request the handler future is dropped, which cancels
//! the in-flight upstream call.
//!
//! No retry across instances: one selection is final for the request.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use storefront_discovery::ServiceInstance;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::server::AppState;

/// Fallback handler: everything that is not a gateway-local endpoint is
/// proxied to a backend service.
pub async fn forward(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();

    let Some(route) = state.routes.resolve(&path) else {
        debug!(path = %path, "No route for path");
        return GatewayError::RouteNotFound.into_response();
    };

    let Some(instance) = state.selector.select(&route.service) else {
        warn!(service = %route.service, path = %path, "No healthy upstream instance");
        return GatewayError::UpstreamUnavailable {
            service: route.service.clone(),
        }
        .into_response();
    };

    let mut url = format!("{}{}", instance.base_url(), route.rewrite(&path));
    if let Some(query) = parts.uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let mut upstream_req = state
        .http
        .request(parts.method.clone(), &url)
        .headers(forward_headers(&parts.headers, peer))
        .timeout(state.upstream_timeout);

    // A request carries a body only when the inbound framing says so; a
    // bodiless GET must not be forwarded as a chunked stream.
    if has_request_body(&parts.headers) {
        upstream_req = upstream_req.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    debug!(
        method = %parts.method,
        service = %route.service,
        instance = %instance.endpoint(),
        url = %url,
        "Forwarding request"
    );

    match upstream_req.send().await {
        Ok(upstream) => relay_response(upstream),
        Err(e) => translate_send_error(e, &route.service, &instance).into_response(),
    }
}

/// Hop-by-hop headers are connection-scoped and must not be forwarded.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Whether the inbound request framing carries a body.
fn has_request_body(headers: &HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_LENGTH) || headers.contains_key(header::TRANSFER_ENCODING)
}

/// Headers for the upstream request: everything except hop-by-hop headers,
/// `Host` (the client set its own) and `Content-Length` (re-derived from
/// the streamed body), with the client address appended to
/// `X-Forwarded-For`.
fn forward_headers(headers: &HeaderMap, peer: SocketAddr) -> HeaderMap {
    let mut out = HeaderMap::new();

    for (name, value) in headers {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    let forwarded_for = match headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(existing) => format!("{existing}, {}", peer.ip()),
        None => peer.ip().to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        out.insert(HeaderName::from_static("x-forwarded-for"), value);
    }

    out
}

/// Relay the upstream response verbatim: status, headers (minus
/// hop-by-hop) and a streamed body. The gateway performs no content
/// rewriting.
fn relay_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();

    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Map an upstream send failure to the client-visible taxonomy. Raw
/// network errors never reach the client.
fn translate_send_error(
    err: reqwest::Error,
    service: &str,
    instance: &ServiceInstance,
) -> GatewayError {
    if err.is_timeout() {
        warn!(
            service = %service,
            instance = %instance.endpoint(),
            "Upstream request timed out"
        );
        GatewayError::UpstreamTimeout {
            service: service.to_string(),
            instance: instance.endpoint(),
        }
    } else {
        warn!(
            service = %service,
            instance = %instance.endpoint(),
            error = %err,
            "Upstream connection failed"
        );
        GatewayError::UpstreamConnectionFailed {
            service: service.to_string(),
            instance: instance.endpoint(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop(&header::CONNECTION));
        assert!(is_hop_by_hop(&header::TRANSFER_ENCODING));
        assert!(!is_hop_by_hop(&header::CONTENT_TYPE));
        assert!(!is_hop_by_hop(&header::AUTHORIZATION));
    }

    #[test]
    fn test_forward_headers_strips_host_and_appends_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token"),
        );
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let peer: SocketAddr = "192.0.2.4:55555".parse().unwrap();
        let out = forward_headers(&headers, peer);

        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert_eq!(
            out.get(header::AUTHORIZATION).unwrap(),
            "Bearer token"
        );
        assert_eq!(out.get("x-forwarded-for").unwrap(), "192.0.2.4");
    }

    #[test]
    fn test_forward_headers_appends_to_existing_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static("203.0.113.9"),
        );

        let peer: SocketAddr = "192.0.2.4:55555".parse().unwrap();
        let out = forward_headers(&headers, peer);

        assert_eq!(
            out.get("x-forwarded-for").unwrap(),
            "203.0.113.9, 192.0.2.4"
        );
    }

    #[test]
    fn test_request_body_detection() {
        let mut headers = HeaderMap::new();
        assert!(!has_request_body(&headers));

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert!(has_request_body(&headers));

        let mut chunked = HeaderMap::new();
        chunked.insert(
            header::TRANSFER_ENCODING,
            HeaderValue::from_static("chunked"),
        );
        assert!(has_request_body(&chunked));
    }
}
