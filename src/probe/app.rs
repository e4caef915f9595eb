//! Secondary application-port check for test hosts.

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;

use crate::config::schema::AppProbeMode;
use crate::probe::ProbeFailure;

/// Application liveness checker.
#[derive(Clone)]
pub struct AppProbe {
    mode: AppProbeMode,
    path: String,
    timeout: Duration,
    client: Client<HttpConnector, Body>,
}

impl AppProbe {
    pub fn new(mode: AppProbeMode, path: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { mode, path: path.into(), timeout, client }
    }

    pub async fn check(&self, addr: SocketAddr) -> Result<(), ProbeFailure> {
        match self.mode {
            AppProbeMode::Tcp => self.check_tcp(addr).await,
            AppProbeMode::Http => self.check_http(addr).await,
        }
    }

    async fn check_tcp(&self, addr: SocketAddr) -> Result<(), ProbeFailure> {
        match time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeFailure::AppUnreachable { port: addr.port(), reason: e.to_string() }),
            Err(_) => Err(ProbeFailure::AppUnreachable {
                port: addr.port(),
                reason: format!("no answer within {:?}", self.timeout),
            }),
        }
    }

    // Any answer below 500 means the application is up.
    async fn check_http(&self, addr: SocketAddr) -> Result<(), ProbeFailure> {
        let request = Request::builder()
            .method("GET")
            .uri(format!("http://{}{}", addr, self.path))
            .header("user-agent", "host-reconciler-probe")
            .body(Body::empty())
            .map_err(|e| ProbeFailure::Internal(format!("failed to build app probe request: {e}")))?;

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) if !response.status().is_server_error() => Ok(()),
            Ok(Ok(response)) => Err(ProbeFailure::AppUnreachable {
                port: addr.port(),
                reason: format!("status {}", response.status()),
            }),
            Ok(Err(e)) => Err(ProbeFailure::AppUnreachable { port: addr.port(), reason: e.to_string() }),
            Err(_) => Err(ProbeFailure::AppUnreachable {
                port: addr.port(),
                reason: format!("no answer within {:?}", self.timeout),
            }),
        }
    }
}
