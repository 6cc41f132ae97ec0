//! Gateway lifecycle management.
//!
//! The lifecycle holds the gateway's own discovery registration and walks
//! the process through `Starting -> Running -> Draining -> Stopped`:
//! register after the listener is bound (non-fatal on failure), serve
//! until shutdown is triggered, drain in-flight requests up to a grace
//! period, then deregister exactly once, best-effort. Both termination
//! signals funnel into the same [`ShutdownHandle::shutdown`] entry point,
//! so there is no duplicated cleanup path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use storefront_discovery::{RegistryClient, ServiceRegistration};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Process states, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Listener bound, registration in progress.
    Starting,
    /// Serving traffic.
    Running,
    /// No new connections; in-flight requests finishing.
    Draining,
    /// Drained and deregistered; the process is exiting.
    Stopped,
}

/// Triggers the lifecycle's shutdown path. Clone freely; the first call
/// wins and later calls are no-ops.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Owns the registration handle and drives the state machine.
pub struct Lifecycle {
    registry: Arc<RegistryClient>,
    registration: ServiceRegistration,
    grace: Duration,
    state_tx: watch::Sender<LifecycleState>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Lifecycle {
    pub fn new(
        registry: Arc<RegistryClient>,
        registration: ServiceRegistration,
        grace: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Starting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            registry,
            registration,
            grace,
            state_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Handle for initiating shutdown (signal task, tests).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// Serve `app` on `listener` until shutdown, then drain and
    /// deregister.
    pub async fn run(self, listener: TcpListener, app: Router) -> Result<()> {
        // Register with the listener already bound, so the advertised
        // health URL is answerable the moment the backend starts probing.
        match self.registry.register(&self.registration).await {
            Ok(()) => info!(
                instance_id = %self.registration.instance_id,
                service = %self.registration.service_name,
                "Registered with discovery backend"
            ),
            Err(e) => {
                let e = crate::error::GatewayError::RegistrationFailed(e);
                warn!(
                    instance_id = %self.registration.instance_id,
                    error = %e,
                    "Registration failed; serving without discovery visibility"
                );
            }
        }

        self.state_tx.send_replace(LifecycleState::Running);

        let server_shutdown = self.shutdown_rx.clone();
        let mut server_handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let mut rx = server_shutdown;
                loop {
                    if *rx.borrow() {
                        break;
                    }
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server draining");
            })
            .await
        });

        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut server_exited = false;
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown_rx) => {}
            result = &mut server_handle => {
                server_exited = true;
                match result {
                    Ok(Ok(())) => info!("Server exited normally"),
                    Ok(Err(e)) => error!(error = %e, "Server error"),
                    Err(e) => error!(error = %e, "Server task panicked"),
                }
            }
        }

        self.state_tx.send_replace(LifecycleState::Draining);

        if !server_exited {
            match tokio::time::timeout(self.grace, &mut server_handle).await {
                Ok(Ok(Ok(()))) => info!("In-flight requests drained"),
                Ok(Ok(Err(e))) => error!(error = %e, "Server error during drain"),
                Ok(Err(e)) => error!(error = %e, "Server task panicked"),
                Err(_) => {
                    warn!(
                        grace_ms = self.grace.as_millis() as u64,
                        "Drain grace period elapsed before all requests finished"
                    );
                    server_handle.abort();
                }
            }
        }

        // Exactly once, best-effort: the process is exiting regardless.
        if let Err(e) = self
            .registry
            .deregister(&self.registration.instance_id)
            .await
        {
            warn!(
                instance_id = %self.registration.instance_id,
                error = %e,
                "Deregistration failed"
            );
        }

        self.state_tx.send_replace(LifecycleState::Stopped);
        info!("Gateway lifecycle stopped");
        Ok(())
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            break;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}
