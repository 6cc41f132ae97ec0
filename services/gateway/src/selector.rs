//! Upstream selection over the discovery cache.
//!
//! Round-robin across the currently healthy instance set, one cursor per
//! service. A request gets exactly one selection; retrying on a different
//! instance is not this layer's job.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use storefront_discovery::{RegistryClient, ServiceInstance};

/// Round-robin picker over healthy instances of named services.
pub struct UpstreamSelector {
    registry: Arc<RegistryClient>,
    cursors: DashMap<String, AtomicUsize>,
}

impl UpstreamSelector {
    pub fn new(registry: Arc<RegistryClient>) -> Self {
        Self {
            registry,
            cursors: DashMap::new(),
        }
    }

    /// Pick the next healthy instance of `service_name`, or `None` when
    /// the healthy set is empty (the caller translates that to a 503).
    pub fn select(&self, service_name: &str) -> Option<ServiceInstance> {
        let mut candidates = self.registry.healthy_instances(service_name);
        if candidates.is_empty() {
            return None;
        }

        let cursor = self
            .cursors
            .entry(service_name.to_string())
            .or_insert_with(|| AtomicUsize::new(0));
        let index = cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();

        Some(candidates.swap_remove(index))
    }
}
