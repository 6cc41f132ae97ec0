//! # storefront-discovery
//!
//! Service discovery client for the storefront platform.
//!
//! The gateway (and any other discovery-aware process) uses this crate to:
//! - Register its own health endpoint with the discovery backend
//! - Deregister on shutdown
//! - Query healthy instances of named backend services
//!
//! The [`DiscoveryBackend`] trait is the pluggable seam: [`HttpDiscovery`]
//! speaks the deployed discovery agent's HTTP API, while [`StaticDiscovery`]
//! is an in-memory table for tests and local development.
//!
//! [`RegistryClient`] layers a read-mostly instance cache on top of a
//! backend. Request-path reads never touch the network; a background refresh
//! loop keeps the cache within a bounded staleness.

mod backend;
mod error;
mod registry;
mod types;

pub use backend::{DiscoveryBackend, HttpDiscovery, StaticDiscovery};
pub use error::DiscoveryError;
pub use registry::{run_refresh_loop, RegistryClient};
pub use types::{ServiceInstance, ServiceRegistration};
