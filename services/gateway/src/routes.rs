//! Static route table mapping path prefixes to backend services.
//!
//! The table is built once at startup from configuration and never mutated
//! afterwards; adding a route requires a restart. Matching is
//! longest-prefix-first with declaration order breaking ties, so lookups
//! are deterministic. Malformed route configuration aborts startup.

use crate::error::GatewayError;

/// A path-prefix-to-service mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Path prefix, e.g. `/api/products`.
    pub prefix: String,

    /// Target service name in the discovery backend, e.g. `product-service`.
    pub service: String,

    /// Whether the matched prefix is removed before forwarding.
    pub strip_prefix: bool,
}

impl Route {
    /// Whether `path` falls under this route's prefix.
    ///
    /// Matches only at a path-segment boundary: `/api/auth` covers
    /// `/api/auth` and `/api/auth/login` but never `/api/authx`.
    pub fn matches(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/')
    }

    /// Rewrite `path` for forwarding, per the strip rule.
    ///
    /// The result always starts with `/`; the query string is handled by
    /// the proxy engine.
    pub fn rewrite(&self, path: &str) -> String {
        if !self.strip_prefix {
            return path.to_string();
        }
        let rest = path.strip_prefix(self.prefix.as_str()).unwrap_or(path);
        if rest.is_empty() {
            "/".to_string()
        } else if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{rest}")
        }
    }
}

/// Immutable route table with deterministic longest-prefix matching.
pub struct RouteTable {
    // Sorted longest-prefix-first; the sort is stable so declaration order
    // breaks ties.
    routes: Vec<Route>,
}

impl RouteTable {
    /// Validate and build the table. Any malformed route is a fatal
    /// configuration error.
    pub fn new(routes: Vec<Route>) -> Result<Self, GatewayError> {
        if routes.is_empty() {
            return Err(GatewayError::ConfigInvalid(
                "route table is empty".to_string(),
            ));
        }

        for route in &routes {
            if !route.prefix.starts_with('/') {
                return Err(GatewayError::ConfigInvalid(format!(
                    "route prefix '{}' must start with '/'",
                    route.prefix
                )));
            }
            if route.service.is_empty() {
                return Err(GatewayError::ConfigInvalid(format!(
                    "route prefix '{}' has an empty service name",
                    route.prefix
                )));
            }
        }

        for (i, route) in routes.iter().enumerate() {
            if routes[..i].iter().any(|r| r.prefix == route.prefix) {
                return Err(GatewayError::ConfigInvalid(format!(
                    "duplicate route prefix '{}'",
                    route.prefix
                )));
            }
        }

        let mut routes = routes;
        routes.sort_by_key(|r| std::cmp::Reverse(r.prefix.len()));

        Ok(Self { routes })
    }

    /// Resolve `path` to its route, longest prefix first.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(path))
    }

    /// Distinct target service names, for the discovery watch list.
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = Vec::new();
        for route in &self.routes {
            if !services.contains(&route.service) {
                services.push(route.service.clone());
            }
        }
        services
    }

    /// Number of routes in the table.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no routes. Unreachable after construction,
    /// kept for the usual len/is_empty pairing.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_route(prefix: &str, service: &str) -> Route {
        Route {
            prefix: prefix.to_string(),
            service: service.to_string(),
            strip_prefix: true,
        }
    }

    #[test]
    fn test_resolve_matches_prefix() {
        let table = RouteTable::new(vec![
            make_route("/api/auth", "auth-service"),
            make_route("/api/products", "product-service"),
        ])
        .unwrap();

        assert_eq!(
            table.resolve("/api/products/abc").unwrap().service,
            "product-service"
        );
        assert_eq!(table.resolve("/api/auth").unwrap().service, "auth-service");
        assert!(table.resolve("/api/unknown/x").is_none());
    }

    #[test]
    fn test_resolve_requires_segment_boundary() {
        let table = RouteTable::new(vec![make_route("/api/auth", "auth-service")]).unwrap();

        assert!(table.resolve("/api/auth/login").is_some());
        assert!(table.resolve("/api/auth").is_some());
        assert!(table.resolve("/api/authx").is_none());
        assert!(table.resolve("/api/authx/login").is_none());
    }

    #[test]
    fn test_resolve_prefers_longest_prefix() {
        let table = RouteTable::new(vec![
            make_route("/api", "catchall-service"),
            make_route("/api/products", "product-service"),
        ])
        .unwrap();

        assert_eq!(
            table.resolve("/api/products/1").unwrap().service,
            "product-service"
        );
        assert_eq!(
            table.resolve("/api/other").unwrap().service,
            "catchall-service"
        );
    }

    #[test]
    fn test_rewrite_strips_prefix() {
        let route = make_route("/api/products", "product-service");
        assert_eq!(route.rewrite("/api/products/abc"), "/abc");
        assert_eq!(route.rewrite("/api/products"), "/");
    }

    #[test]
    fn test_rewrite_keeps_prefix_when_configured() {
        let route = Route {
            prefix: "/api/orders".to_string(),
            service: "order-service".to_string(),
            strip_prefix: false,
        };
        assert_eq!(route.rewrite("/api/orders/42"), "/api/orders/42");
    }

    #[test]
    fn test_empty_table_rejected() {
        match RouteTable::new(Vec::new()) {
            Err(GatewayError::ConfigInvalid(_)) => {}
            other => panic!("Expected ConfigInvalid, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let result = RouteTable::new(vec![
            make_route("/api/auth", "auth-service"),
            make_route("/api/auth", "other-service"),
        ]);
        assert!(matches!(result, Err(GatewayError::ConfigInvalid(_))));
    }

    #[test]
    fn test_relative_prefix_rejected() {
        let result = RouteTable::new(vec![make_route("api/auth", "auth-service")]);
        assert!(matches!(result, Err(GatewayError::ConfigInvalid(_))));
    }

    #[test]
    fn test_services_are_distinct_and_ordered() {
        let table = RouteTable::new(vec![
            make_route("/api/products", "product-service"),
            make_route("/internal/products", "product-service"),
            make_route("/api/auth", "auth-service"),
        ])
        .unwrap();

        assert_eq!(
            table.services(),
            vec!["product-service".to_string(), "auth-service".to_string()]
        );
    }
}
