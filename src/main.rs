//! Host reconciler service.
//!
//! # Architecture Overview
//!
//! ```text
//!   HTTP request
//!       → http (axum, auth, request id)
//!       → host service (CRUD, uniqueness, direct tests, lazy sweep)
//!       → reconcile engine
//!             ├─ store     versioned host records (compare-and-swap)
//!             ├─ ledger    batch progress map + distributed lock (TTL keys)
//!             ├─ executor  bounded background tasks
//!             └─ probe     SSH handshake (+ app port for test hosts)
//!
//!   Cross-cutting: config (TOML + hot reload), observability (tracing,
//!   Prometheus), lifecycle (signals, graceful drain)
//! ```

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use host_reconciler::config::loader::{load_config, resolve_config_path};
use host_reconciler::config::watcher::ConfigWatcher;
use host_reconciler::config::ReconcilerConfig;
use host_reconciler::ledger::InMemoryLedger;
use host_reconciler::lifecycle::{wait_for_termination, Shutdown};
use host_reconciler::observability::{logging, metrics};
use host_reconciler::probe::SshProber;
use host_reconciler::store::{InMemoryDeploymentRefs, InMemoryHostStore};
use host_reconciler::{BatchCorrector, HostService, HttpServer};

/// Longest wait for background status checks after the HTTP server stopped.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(std::env::args().nth(1));
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => ReconcilerConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "host-reconciler starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        config_file = ?config_path,
        max_concurrent_probes = config.reconcile.max_concurrent_probes,
        deploy_operating_timeout_secs = config.reconcile.deploy_operating_timeout_secs,
        test_operating_timeout_secs = config.reconcile.test_operating_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let prober = Arc::new(SshProber::new(&config.probe));
    let live_config = Arc::new(ArcSwap::from_pointee(config));
    let store = Arc::new(InMemoryHostStore::new());
    let engine = BatchCorrector::new(store.clone(), Arc::new(InMemoryLedger::new()), prober, live_config.clone());
    let executor = engine.executor().clone();
    let service = HostService::new(store, Arc::new(InMemoryDeploymentRefs::new()), engine);

    // The watcher handle must stay alive for reload events to flow.
    let (config_updates, _watcher) = match &config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to start config watcher, hot reload disabled");
                    (mpsc::unbounded_channel().1, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let shutdown = Arc::new(Shutdown::new());
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_termination().await;
        signal_shutdown.trigger();
    });

    let server = HttpServer::new(live_config, service);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    shutdown.drain_executor(&executor, DRAIN_DEADLINE).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
