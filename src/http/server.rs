//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum router with every host route
//! - Wire up middleware (request id, tracing, timeout, body limit, auth)
//! - Apply hot-reloaded configuration
//! - Serve until the shutdown signal fires

use arc_swap::ArcSwap;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    map_response_body::MapResponseBodyLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ReconcilerConfig;
use crate::host::HostService;
use crate::http::handlers::*;
use crate::http::middleware::api_key_auth;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: HostService,
    pub config: Arc<ArcSwap<ReconcilerConfig>>,
}

/// HTTP server for the host API.
pub struct HttpServer {
    router: Router,
    config: Arc<ArcSwap<ReconcilerConfig>>,
}

impl HttpServer {
    /// Create a server over `service`, sharing the live config with the engine.
    pub fn new(config: Arc<ArcSwap<ReconcilerConfig>>, service: HostService) -> Self {
        let state = AppState { service, config: config.clone() };
        let router = Self::build_router(&config.load(), state);
        Self { router, config }
    }

    /// Build the axum router with all middleware layers.
    ///
    /// Timeout and body limit are fixed at startup; the API key follows reloads.
    /// `/health` and the install script download sit outside the API key check.
    #[allow(deprecated)]
    fn build_router(config: &ReconcilerConfig, state: AppState) -> Router {
        let hosts = Router::new()
            .route("/v1/projects/{project_id}/hosts", post(create_host).get(list_hosts))
            .route(
                "/v1/projects/{project_id}/hosts/{id}",
                get(query_host).put(update_host).delete(delete_host),
            )
            .route("/v1/projects/{project_id}/hosts/batch_set_operating", post(batch_set_operating))
            .route("/v1/projects/{project_id}/hosts/correct", post(correct))
            .route("/v1/projects/{project_id}/hosts/correct_with_progress", post(correct_with_progress))
            .route("/v1/projects/{project_id}/hosts/checking_progress", get(checking_progress))
            .route(
                "/v1/projects/{project_id}/hosts/paging_with_checking_status",
                get(paging_with_checking_status),
            )
            .route("/v1/projects/{project_id}/hosts/connection_test", post(connection_test))
            .route("/v1/projects/{project_id}/hosts/multi_connection_test", post(multi_connection_test))
            .route("/v1/projects/{project_id}/hosts/{id}/connection_test", get(deploy_host_connection_test))
            .route("/v1/projects/{project_id}/hosts/check/name_unique", get(name_unique))
            .route("/v1/projects/{project_id}/hosts/check/ip_unique", get(ip_unique))
            .route_layer(middleware::from_fn_with_state(state.clone(), api_key_auth));

        Router::new()
            .route("/health", get(get_health))
            .route(
                "/v1/projects/{project_id}/hosts/{id}/download_file/{token}",
                get(download_install_script),
            )
            .merge(hosts)
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                    .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Validated configs received on `config_updates` replace the live config
    /// until shutdown.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ReconcilerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let live = self.config.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(new_config) => {
                            live.store(Arc::new(new_config));
                            tracing::info!("Configuration reloaded");
                        }
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<ReconcilerConfig> {
        self.config.load_full()
    }
}
