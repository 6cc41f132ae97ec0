//! Data types shared across discovery operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single registered instance of a backend service.
///
/// Owned by the [`RegistryClient`](crate::RegistryClient) cache; everything
/// else in the gateway reads these as immutable snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Logical service name, e.g. `product-service`.
    pub service_name: String,

    /// Host or IP the instance listens on.
    pub address: String,

    /// TCP port the instance listens on.
    pub port: u16,

    /// Whether the discovery backend currently reports the instance healthy.
    pub healthy: bool,

    /// When the health status was last observed.
    pub last_check: DateTime<Utc>,
}

impl ServiceInstance {
    /// Base URL for forwarding requests to this instance.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }

    /// Instance identity for logs (`address:port`).
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// A process's own registration with the discovery backend.
///
/// Exactly one of these exists per running gateway process. Created at
/// startup, deleted (deregistered) at shutdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistration {
    /// Unique instance id, distinct per process start.
    pub instance_id: String,

    /// Logical service name to register under.
    pub service_name: String,

    /// Advertised host or IP.
    pub address: String,

    /// Advertised port.
    pub port: u16,

    /// URL the discovery backend should probe for liveness.
    pub health_check_url: String,

    /// Interval, in seconds, between health probes.
    pub check_interval_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_base_url() {
        let instance = ServiceInstance {
            service_name: "product-service".to_string(),
            address: "10.0.0.7".to_string(),
            port: 4010,
            healthy: true,
            last_check: Utc::now(),
        };
        assert_eq!(instance.base_url(), "http://10.0.0.7:4010");
        assert_eq!(instance.endpoint(), "10.0.0.7:4010");
    }
}
