//! CORS policy from the configured origin allow-list.
//!
//! Only listed origins are reflected; any other origin gets no CORS
//! headers and the browser blocks the response client-side, so the
//! gateway does not reject the request itself.

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::GatewayError;

/// Build the CORS layer. An unparseable origin is a fatal configuration
/// error.
pub fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, GatewayError> {
    let mut origins = Vec::with_capacity(allowed_origins.len());
    for origin in allowed_origins {
        let value = origin.parse::<HeaderValue>().map_err(|_| {
            GatewayError::ConfigInvalid(format!("invalid CORS origin '{origin}'"))
        })?;
        origins.push(value);
    }

    Ok(CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(AllowOrigin::list(origins)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_origins_accepted() {
        let origins = vec![
            "https://shop.example.com".to_string(),
            "http://localhost:3000".to_string(),
        ];
        assert!(cors_layer(&origins).is_ok());
    }

    #[test]
    fn test_empty_allow_list_accepted() {
        assert!(cors_layer(&[]).is_ok());
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let origins = vec!["https://bad\norigin".to_string()];
        assert!(matches!(
            cors_layer(&origins),
            Err(GatewayError::ConfigInvalid(_))
        ));
    }
}
