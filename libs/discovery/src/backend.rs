//! Discovery backend implementations.
//!
//! [`DiscoveryBackend`] is the contract the gateway depends on; the concrete
//! wire format belongs to whichever discovery system is deployed.
//! [`HttpDiscovery`] targets a Consul-style agent HTTP API.
//! [`StaticDiscovery`] serves a fixed in-memory table for tests and local
//! development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::DiscoveryError;
use crate::types::{ServiceInstance, ServiceRegistration};

/// Contract between the gateway and the discovery system.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Register a service instance. After success the backend starts
    /// actively probing the supplied health-check URL.
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), DiscoveryError>;

    /// Remove a previously registered instance.
    async fn deregister(&self, instance_id: &str) -> Result<(), DiscoveryError>;

    /// Query instances of `service_name` that currently pass their checks.
    async fn healthy_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<ServiceInstance>, DiscoveryError>;
}

/// Default request timeout for discovery calls. Lookups sit on the cache
/// refresh path, so a hung agent must not stall the loop for long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the backend waits before reaping an instance whose check has
/// been critical, passed on registration.
const DEREGISTER_AFTER: &str = "1m";

/// Discovery backend speaking a Consul-style agent HTTP API.
pub struct HttpDiscovery {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDiscovery {
    /// Create a client against the agent at `base_url`
    /// (example: `http://localhost:8500`).
    pub fn new(base_url: &str) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(DiscoveryError::from)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RegisterPayload<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    check: CheckPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CheckPayload {
    #[serde(rename = "HTTP")]
    http: String,
    interval: String,
    deregister_critical_service_after: String,
}

#[derive(Debug, Deserialize)]
struct HealthEntry {
    #[serde(rename = "Service")]
    service: HealthService,
    #[serde(default, rename = "Checks")]
    checks: Vec<HealthCheck>,
}

#[derive(Debug, Deserialize)]
struct HealthService {
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
}

#[derive(Debug, Deserialize)]
struct HealthCheck {
    #[serde(rename = "Status")]
    status: String,
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DiscoveryError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(DiscoveryError::Status { status, body })
}

#[async_trait]
impl DiscoveryBackend for HttpDiscovery {
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), DiscoveryError> {
        let url = format!("{}/v1/agent/service/register", self.base_url);
        debug!(
            instance_id = %registration.instance_id,
            service = %registration.service_name,
            "Registering with discovery backend"
        );

        let payload = RegisterPayload {
            id: &registration.instance_id,
            name: &registration.service_name,
            address: &registration.address,
            port: registration.port,
            check: CheckPayload {
                http: registration.health_check_url.clone(),
                interval: format!("{}s", registration.check_interval_secs),
                deregister_critical_service_after: DEREGISTER_AFTER.to_string(),
            },
        };

        let response = self.client.put(&url).json(&payload).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), DiscoveryError> {
        let url = format!("{}/v1/agent/service/deregister/{}", self.base_url, instance_id);
        debug!(instance_id = %instance_id, "Deregistering from discovery backend");

        let response = self.client.put(&url).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn healthy_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        let url = format!("{}/v1/health/service/{}", self.base_url, service_name);

        let response = self
            .client
            .get(&url)
            .query(&[("passing", "true")])
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let entries: Vec<HealthEntry> = response
            .json()
            .await
            .map_err(|e| DiscoveryError::InvalidResponse(e.to_string()))?;

        let now = chrono::Utc::now();
        let instances = entries
            .into_iter()
            .map(|entry| {
                let healthy = entry.checks.iter().all(|c| c.status == "passing");
                ServiceInstance {
                    service_name: entry.service.service,
                    address: entry.service.address,
                    port: entry.service.port,
                    healthy,
                    last_check: now,
                }
            })
            .collect();

        Ok(instances)
    }
}

/// In-memory discovery backend for tests and local development.
///
/// Registrations and deregistrations are recorded so tests can assert on
/// them; `set_unavailable` simulates a discovery outage.
#[derive(Default)]
pub struct StaticDiscovery {
    instances: RwLock<HashMap<String, Vec<ServiceInstance>>>,
    registered: RwLock<Vec<ServiceRegistration>>,
    deregistered: RwLock<Vec<String>>,
    unavailable: AtomicBool,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the instance set for a service.
    pub async fn set_instances(&self, service_name: &str, instances: Vec<ServiceInstance>) {
        self.instances
            .write()
            .await
            .insert(service_name.to_string(), instances);
    }

    /// Drop all instances of a service.
    pub async fn clear_service(&self, service_name: &str) {
        self.instances.write().await.remove(service_name);
    }

    /// Simulate the discovery backend being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Registrations observed so far.
    pub async fn registrations(&self) -> Vec<ServiceRegistration> {
        self.registered.read().await.clone()
    }

    /// Instance ids deregistered so far.
    pub async fn deregistrations(&self) -> Vec<String> {
        self.deregistered.read().await.clone()
    }

    fn check_available(&self) -> Result<(), DiscoveryError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(DiscoveryError::Transport(
                "discovery backend unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DiscoveryBackend for StaticDiscovery {
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), DiscoveryError> {
        self.check_available()?;
        self.registered.write().await.push(registration.clone());
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), DiscoveryError> {
        self.check_available()?;
        self.deregistered.write().await.push(instance_id.to_string());
        Ok(())
    }

    async fn healthy_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        self.check_available()?;
        Ok(self
            .instances
            .read()
            .await
            .get(service_name)
            .cloned()
            .unwrap_or_default())
    }
}
