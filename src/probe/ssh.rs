//! SSH connectivity probe.
//!
//! Opens a TCP connection, runs the SSH handshake, authenticates with the
//! host's password or private key, then disconnects. libssh2 is blocking, so
//! the session runs on the blocking pool under an outer deadline.

use async_trait::async_trait;
use ssh2::Session;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;

use crate::config::schema::ProbeConfig;
use crate::host::model::{AuthMode, HostClass};
use crate::probe::app::AppProbe;
use crate::probe::{ConnectionParams, ProbeFailure, ProbeReport, Prober};

// Slack on top of the socket timeouts before the outer deadline fires.
const DEADLINE_SLACK: Duration = Duration::from_secs(1);

/// Production prober: SSH for every host, plus the application port for test hosts.
pub struct SshProber {
    ssh_timeout: Duration,
    app: AppProbe,
}

impl SshProber {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            ssh_timeout: config.ssh_timeout(),
            app: AppProbe::new(config.app_probe, config.app_probe_path.clone(), config.app_timeout()),
        }
    }

    async fn check_ssh(&self, params: &ConnectionParams) -> Result<(), ProbeFailure> {
        let addr = target_addr(&params.host_ip, params.ssh_port)?;
        let timeout = self.ssh_timeout;
        let auth_mode = params.auth_mode;
        let username = params.username.clone();
        let secret = params.secret.clone();

        let session = tokio::task::spawn_blocking(move || {
            open_session(addr, auth_mode, &username, &secret, timeout)
        });
        match tokio::time::timeout(timeout + DEADLINE_SLACK, session).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ProbeFailure::Internal(format!("ssh probe task failed: {e}"))),
            Err(_) => Err(ProbeFailure::Timeout(timeout)),
        }
    }

    async fn check_app(&self, params: &ConnectionParams) -> Result<(), ProbeFailure> {
        let port = params
            .app_port
            .ok_or_else(|| ProbeFailure::Internal("test host has no application port".into()))?;
        let addr = target_addr(&params.host_ip, port)?;
        self.app.check(addr).await
    }
}

#[async_trait]
impl Prober for SshProber {
    async fn probe(&self, params: &ConnectionParams) -> ProbeReport {
        match params.class {
            HostClass::Deploy => ProbeReport { ssh: self.check_ssh(params).await, app: None },
            HostClass::Test => {
                let (ssh, app) = tokio::join!(self.check_ssh(params), self.check_app(params));
                ProbeReport { ssh, app: Some(app) }
            }
        }
    }
}

fn target_addr(host_ip: &str, port: u16) -> Result<SocketAddr, ProbeFailure> {
    host_ip
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|_| ProbeFailure::Unreachable(format!("invalid address {host_ip}")))
}

fn open_session(
    addr: SocketAddr,
    auth_mode: AuthMode,
    username: &str,
    secret: &str,
    timeout: Duration,
) -> Result<(), ProbeFailure> {
    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| match e.kind() {
        std::io::ErrorKind::TimedOut => ProbeFailure::Timeout(timeout),
        _ => ProbeFailure::Unreachable(format!("{addr}: {e}")),
    })?;
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();

    let mut session =
        Session::new().map_err(|e| ProbeFailure::Internal(format!("failed to create ssh session: {e}")))?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| map_ssh_error(e, timeout, ProbeFailure::Unreachable))?;

    let auth = match auth_mode {
        AuthMode::Password => session.userauth_password(username, secret),
        AuthMode::Key => session.userauth_pubkey_memory(username, None, secret, None),
    };
    auth.map_err(|e| map_ssh_error(e, timeout, ProbeFailure::AuthRejected))?;
    if !session.authenticated() {
        return Err(ProbeFailure::AuthRejected(format!("{username}@{addr}")));
    }

    let _ = session.disconnect(None, "probe complete", None);
    Ok(())
}

fn map_ssh_error(
    err: ssh2::Error,
    timeout: Duration,
    otherwise: fn(String) -> ProbeFailure,
) -> ProbeFailure {
    let message = err.to_string();
    let io_err: std::io::Error = err.into();
    match io_err.kind() {
        std::io::ErrorKind::TimedOut => ProbeFailure::Timeout(timeout),
        _ => otherwise(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn params(port: u16, class: HostClass, app_port: Option<u16>) -> ConnectionParams {
        ConnectionParams {
            host_ip: "127.0.0.1".into(),
            ssh_port: port,
            auth_mode: AuthMode::Password,
            username: "root".into(),
            secret: "secret".into(),
            class,
            app_port,
        }
    }

    fn prober() -> SshProber {
        let config = ProbeConfig { ssh_timeout_secs: 2, app_timeout_secs: 1, ..ProbeConfig::default() };
        SshProber::new(&config)
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let port = closed_port().await;
        let report = prober().probe(&params(port, HostClass::Deploy, None)).await;
        assert!(matches!(report.ssh, Err(ProbeFailure::Unreachable(_))));
        assert_eq!(report.app, None);
        assert!(!report.passed());
    }

    #[tokio::test]
    async fn test_non_ssh_server_fails_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
                let _ = socket.shutdown().await;
            }
        });

        let report = prober().probe(&params(port, HostClass::Deploy, None)).await;
        assert!(report.ssh.is_err());
    }

    #[tokio::test]
    async fn test_test_host_runs_app_check() {
        let app = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let app_port = app.local_addr().unwrap().port();
        let ssh_port = closed_port().await;

        let report = prober().probe(&params(ssh_port, HostClass::Test, Some(app_port))).await;
        assert!(report.ssh.is_err());
        assert_eq!(report.app, Some(Ok(())));

        let missing = prober().probe(&params(ssh_port, HostClass::Test, None)).await;
        assert!(matches!(missing.app, Some(Err(ProbeFailure::Internal(_)))));
    }

    #[test]
    fn test_invalid_address() {
        assert!(matches!(target_addr("web-1", 22), Err(ProbeFailure::Unreachable(_))));
        assert_eq!(target_addr("::1", 22).unwrap().to_string(), "[::1]:22");
    }
}
