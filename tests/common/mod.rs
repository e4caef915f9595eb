//! Shared utilities for integration tests.

#![allow(dead_code)]

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use host_reconciler::config::ReconcilerConfig;
use host_reconciler::host::model::{AuthMode, CreateHostRequest, HostClass};
use host_reconciler::ledger::InMemoryLedger;
use host_reconciler::probe::{ConnectionParams, ProbeFailure, ProbeReport, Prober};
use host_reconciler::store::{InMemoryDeploymentRefs, InMemoryHostStore};
use host_reconciler::{BatchCorrector, HostService, HttpServer, Shutdown};

/// Prober whose verdict is scripted per host IP.
///
/// Unscripted hosts pass. Every call is counted per IP.
#[derive(Default)]
pub struct ScriptedProber {
    failing: DashMap<String, ()>,
    delay: DashMap<String, Duration>,
    calls: DashMap<String, usize>,
}

impl ScriptedProber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, ip: &str) {
        self.failing.insert(ip.to_string(), ());
    }

    pub fn slow(&self, ip: &str, delay: Duration) {
        self.delay.insert(ip.to_string(), delay);
    }

    pub fn calls(&self, ip: &str) -> usize {
        self.calls.get(ip).map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, params: &ConnectionParams) -> ProbeReport {
        *self.calls.entry(params.host_ip.clone()).or_insert(0) += 1;
        let delay = self.delay.get(&params.host_ip).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let ssh = if self.failing.contains_key(&params.host_ip) {
            Err(ProbeFailure::Unreachable(format!("{}:{} refused", params.host_ip, params.ssh_port)))
        } else {
            Ok(())
        };
        let app = (params.class == HostClass::Test).then_some(Ok(()));
        ProbeReport { ssh, app }
    }
}

/// Config tuned for fast tests.
pub fn test_config() -> ReconcilerConfig {
    let mut config = ReconcilerConfig::default();
    config.reconcile.follow_poll_interval_ms = 20;
    config.reconcile.retry_base_delay_ms = 1;
    config.reconcile.retry_max_delay_ms = 5;
    config.ledger.lock_retry_interval_ms = 5;
    config.observability.metrics_enabled = false;
    config.agent.download_api_url = "http://agent.test".into();
    config
}

pub struct Harness {
    pub store: Arc<InMemoryHostStore>,
    pub refs: Arc<InMemoryDeploymentRefs>,
    pub ledger: Arc<InMemoryLedger>,
    pub config: Arc<ArcSwap<ReconcilerConfig>>,
    pub service: HostService,
}

impl Harness {
    pub fn engine(&self) -> &BatchCorrector {
        self.service.engine()
    }

    /// Wait until every background task finished.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.engine().executor().wait_idle())
            .await
            .expect("background tasks did not settle");
    }
}

/// In-memory wiring of the whole engine around `prober`.
pub fn harness(config: ReconcilerConfig, prober: Arc<dyn Prober>) -> Harness {
    let store = Arc::new(InMemoryHostStore::new());
    let refs = Arc::new(InMemoryDeploymentRefs::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let config = Arc::new(ArcSwap::from_pointee(config));
    let engine = BatchCorrector::new(store.clone(), ledger.clone(), prober, config.clone());
    let service = HostService::new(store.clone(), refs.clone(), engine);
    Harness { store, refs, ledger, config, service }
}

pub fn deploy_host(name: &str, ip: &str) -> CreateHostRequest {
    CreateHostRequest {
        name: name.into(),
        class: HostClass::Deploy,
        host_ip: ip.into(),
        ssh_port: 22,
        private_ip: None,
        private_port: None,
        auth_mode: AuthMode::Password,
        username: "root".into(),
        secret: "secret".into(),
        app_port: None,
    }
}

pub fn test_host(name: &str, ip: &str) -> CreateHostRequest {
    CreateHostRequest { class: HostClass::Test, app_port: Some(1099), ..deploy_host(name, ip) }
}

/// Start the HTTP server on an ephemeral port.
pub async fn start_server(harness: &Harness) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(harness.config.clone(), harness.service.clone());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

/// A TCP listener that accepts, writes a banner that is not SSH, and hangs up.
pub async fn start_non_ssh_listener() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}
