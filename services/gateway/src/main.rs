//! Storefront gateway
//!
//! Service-discovery-backed reverse proxy in front of the storefront's
//! backend services.
//!
//! This service:
//! - Maps configured path prefixes to named backend services
//! - Resolves instances through the discovery backend's health view
//! - Forwards requests with streaming bodies, round-robin per service
//! - Applies rate limiting and CORS ahead of the proxy engine
//! - Registers its own health endpoint with discovery for its lifetime

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use storefront_discovery::{
    run_refresh_loop, HttpDiscovery, RegistryClient, ServiceRegistration,
};
use storefront_gateway::config::Config;
use storefront_gateway::middleware::rate_limit::{run_sweep_loop, RateLimiter};
use storefront_gateway::routes::RouteTable;
use storefront_gateway::selector::UpstreamSelector;
use storefront_gateway::server::{build_router, AppState};
use storefront_gateway::Lifecycle;

const SERVICE_NAME: &str = "gateway";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to GATEWAY_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting storefront gateway");
    info!(
        listen_addr = %config.listen_addr,
        discovery_url = %config.discovery_url,
        route_count = config.routes.len(),
        rate_limit_max = config.rate_limit_max,
        "Configuration loaded"
    );

    // A route table the gateway cannot trust must prevent startup.
    let routes = Arc::new(RouteTable::new(config.routes.clone())?);

    let backend = Arc::new(HttpDiscovery::new(&config.discovery_url)?);
    let registry = Arc::new(RegistryClient::new(
        backend,
        routes.services(),
        config.discovery_refresh,
        config.discovery_stale,
    ));

    // Shutdown channel for background workers
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);

    let refresh_handle = tokio::spawn(run_refresh_loop(
        Arc::clone(&registry),
        worker_shutdown_rx.clone(),
    ));

    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max,
        config.rate_limit_window,
    ));
    let sweep_handle = tokio::spawn(run_sweep_loop(
        Arc::clone(&rate_limiter),
        worker_shutdown_rx.clone(),
    ));

    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build upstream HTTP client")?;

    let state = AppState {
        routes: Arc::clone(&routes),
        selector: Arc::new(UpstreamSelector::new(Arc::clone(&registry))),
        rate_limiter: Arc::clone(&rate_limiter),
        http,
        upstream_timeout: config.upstream_timeout,
    };
    let app = build_router(state, &config.allowed_origins)?;

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let registration = ServiceRegistration {
        instance_id: format!("{SERVICE_NAME}-{}", Uuid::new_v4()),
        service_name: SERVICE_NAME.to_string(),
        address: config.advertise_addr.ip().to_string(),
        port: config.advertise_addr.port(),
        health_check_url: config.health_check_url(),
        check_interval_secs: config.check_interval_secs,
    };

    let lifecycle = Lifecycle::new(Arc::clone(&registry), registration, config.shutdown_grace);

    // Both termination signals drive the same shutdown entry point.
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let shutdown = lifecycle.shutdown_handle();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!(signal = "SIGTERM", "Received termination signal"),
            _ = sigint.recv() => info!(signal = "SIGINT", "Received termination signal"),
        }
        shutdown.shutdown();
    });

    lifecycle.run(listener, app).await?;

    // Signal shutdown to background workers and give them a bounded window.
    let _ = worker_shutdown_tx.send(true);
    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(5);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, refresh_handle).await {
        warn!(error = %e, "Discovery refresh loop did not shut down in time");
    }

    if let Err(e) = tokio::time::timeout(shutdown_timeout, sweep_handle).await {
        warn!(error = %e, "Rate-limit sweep loop did not shut down in time");
    }

    info!("Gateway shutdown complete");
    Ok(())
}
