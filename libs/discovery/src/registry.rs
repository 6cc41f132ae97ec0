//! Registry client: self-registration plus a cached view of backend
//! instances.
//!
//! The request path must never wait on the discovery backend, so lookups
//! read an atomically swapped snapshot while a background loop polls the
//! backend at a fixed interval. Readers get consistent snapshots without
//! blocking; the refresh loop is the only writer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::DiscoveryBackend;
use crate::error::DiscoveryError;
use crate::types::{ServiceInstance, ServiceRegistration};

#[derive(Clone)]
struct CachedService {
    instances: Vec<ServiceInstance>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheSnapshot {
    services: HashMap<String, CachedService>,
}

/// Cached discovery client for a fixed set of watched services.
pub struct RegistryClient {
    backend: Arc<dyn DiscoveryBackend>,
    services: Vec<String>,
    snapshot: ArcSwap<CacheSnapshot>,
    refresh_interval: Duration,
    freshness: Duration,
}

impl RegistryClient {
    /// Create a client watching `services`.
    ///
    /// `refresh_interval` is how often the background loop polls the
    /// backend; `freshness` bounds how long a snapshot may be served after
    /// the backend stops answering.
    pub fn new(
        backend: Arc<dyn DiscoveryBackend>,
        services: Vec<String>,
        refresh_interval: Duration,
        freshness: Duration,
    ) -> Self {
        Self {
            backend,
            services,
            snapshot: ArcSwap::from_pointee(CacheSnapshot::default()),
            refresh_interval,
            freshness,
        }
    }

    /// Interval the refresh loop polls at.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Register this process with the discovery backend.
    pub async fn register(&self, registration: &ServiceRegistration) -> Result<(), DiscoveryError> {
        self.backend.register(registration).await
    }

    /// Deregister this process. Called exactly once during shutdown.
    pub async fn deregister(&self, instance_id: &str) -> Result<(), DiscoveryError> {
        self.backend.deregister(instance_id).await
    }

    /// Healthy instances of `service_name` from the local cache.
    ///
    /// Never performs network I/O. Returns the last good snapshot while it
    /// is younger than the freshness threshold, otherwise an empty set.
    pub fn healthy_instances(&self, service_name: &str) -> Vec<ServiceInstance> {
        let snapshot = self.snapshot.load();
        let Some(cached) = snapshot.services.get(service_name) else {
            return Vec::new();
        };

        if cached.fetched_at.elapsed() > self.freshness {
            debug!(
                service = %service_name,
                "Discovery snapshot stale, treating service as unavailable"
            );
            return Vec::new();
        }

        cached
            .instances
            .iter()
            .filter(|i| i.healthy)
            .cloned()
            .collect()
    }

    /// Poll the backend once for every watched service and swap in a new
    /// snapshot. A failed query keeps the previous entry (and its age), so
    /// staleness accrues until the backend answers again.
    pub async fn refresh_once(&self) {
        let current = self.snapshot.load();
        let mut services = current.services.clone();

        for service in &self.services {
            match self.backend.healthy_instances(service).await {
                Ok(instances) => {
                    debug!(
                        service = %service,
                        instance_count = instances.len(),
                        "Refreshed instance cache"
                    );
                    services.insert(
                        service.clone(),
                        CachedService {
                            instances,
                            fetched_at: Instant::now(),
                        },
                    );
                }
                Err(e) => {
                    warn!(
                        service = %service,
                        error = %e,
                        "Failed to refresh instances, keeping cached snapshot"
                    );
                }
            }
        }

        self.snapshot.store(Arc::new(CacheSnapshot { services }));
    }
}

/// Run the cache refresh loop until shutdown.
pub async fn run_refresh_loop(client: Arc<RegistryClient>, mut shutdown: watch::Receiver<bool>) {
    info!(
        service_count = client.services.len(),
        interval_ms = client.refresh_interval.as_millis() as u64,
        "Starting discovery refresh loop"
    );

    let mut interval_timer = tokio::time::interval(client.refresh_interval);

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                client.refresh_once().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Discovery refresh loop shutting down");
                    break;
                }
            }
        }
    }
}
