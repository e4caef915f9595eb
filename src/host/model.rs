//! Host records and request payloads.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::host::status::HostStatus;
use crate::probe::ConnectionParams;

pub type HostId = u64;
pub type ProjectId = u64;
pub type UserId = u64;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// What a host is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostClass {
    /// Deployment target; only the SSH probe decides its status.
    Deploy,
    /// Test-execution target; also needs its application port to answer.
    Test,
}

impl HostClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostClass::Deploy => "deploy",
            HostClass::Test => "test",
        }
    }
}

/// How the SSH session authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// `secret` is the account password.
    Password,
    /// `secret` is a PEM private key.
    Key,
}

/// A managed host as held by the durable store.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub project_id: ProjectId,
    pub id: HostId,
    /// Unique within the project.
    pub name: String,
    pub host_ip: String,
    pub ssh_port: u16,
    pub private_ip: Option<String>,
    pub private_port: Option<u16>,
    pub auth_mode: AuthMode,
    pub username: String,
    pub secret: String,
    /// Token handed to the host agent at install time.
    pub token: String,
    pub class: HostClass,
    /// Secondary-probe port, always present for `Test` hosts.
    pub app_port: Option<u16>,
    pub status: HostStatus,
    pub check_error: Option<String>,
    /// Set when a test host timed out mid-check and is considered leased.
    pub occupied: bool,
    /// Optimistic-concurrency version, bumped by every store update.
    pub version: u64,
    pub last_update_ms: u64,
    pub last_updated_by: Option<UserId>,
}

impl Host {
    /// Parameters the connectivity probe needs for this host.
    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            host_ip: self.host_ip.clone(),
            ssh_port: self.ssh_port,
            auth_mode: self.auth_mode,
            username: self.username.clone(),
            secret: self.secret.clone(),
            class: self.class,
            app_port: self.app_port,
        }
    }

    /// Milliseconds since the record was last updated.
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_update_ms)
    }

    /// True when the host sat in `Operating` for at least `timeout`.
    pub fn is_operating_timed_out(&self, timeout: Duration, now_ms: u64) -> bool {
        self.status == HostStatus::Operating && self.idle_ms(now_ms) >= timeout.as_millis() as u64
    }

    /// Case-insensitive substring match on name or IP. Blank terms match everything.
    pub fn matches_search(&self, search: Option<&str>) -> bool {
        match search.map(str::trim).filter(|s| !s.is_empty()) {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                self.name.to_lowercase().contains(&term) || self.host_ip.contains(&term)
            }
        }
    }

    /// Stamp the record as touched by `actor` at `now_ms`.
    pub fn touch(&mut self, actor: Option<UserId>, now_ms: u64) {
        self.last_update_ms = now_ms;
        if actor.is_some() {
            self.last_updated_by = actor;
        }
    }
}

/// Host as returned by the API; never carries the secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostView {
    pub project_id: ProjectId,
    pub id: HostId,
    pub name: String,
    pub host_ip: String,
    pub ssh_port: u16,
    pub private_ip: Option<String>,
    pub private_port: Option<u16>,
    pub auth_mode: AuthMode,
    pub username: String,
    pub class: HostClass,
    pub app_port: Option<u16>,
    pub status: HostStatus,
    pub check_error: Option<String>,
    pub occupied: bool,
    pub version: u64,
    pub last_update_ms: u64,
    pub last_updated_by: Option<UserId>,
}

impl From<&Host> for HostView {
    fn from(host: &Host) -> Self {
        Self {
            project_id: host.project_id,
            id: host.id,
            name: host.name.clone(),
            host_ip: host.host_ip.clone(),
            ssh_port: host.ssh_port,
            private_ip: host.private_ip.clone(),
            private_port: host.private_port,
            auth_mode: host.auth_mode,
            username: host.username.clone(),
            class: host.class,
            app_port: host.app_port,
            status: host.status,
            check_error: host.check_error.clone(),
            occupied: host.occupied,
            version: host.version,
            last_update_ms: host.last_update_ms,
            last_updated_by: host.last_updated_by,
        }
    }
}

/// Payload for registering a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHostRequest {
    pub name: String,
    pub class: HostClass,
    pub host_ip: String,
    pub ssh_port: u16,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub private_port: Option<u16>,
    pub auth_mode: AuthMode,
    pub username: String,
    pub secret: String,
    #[serde(default)]
    pub app_port: Option<u16>,
}

/// Payload for editing a host's identity and connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateHostRequest {
    pub name: String,
    pub host_ip: String,
    pub ssh_port: u16,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub private_port: Option<u16>,
    pub auth_mode: AuthMode,
    pub username: String,
    pub secret: String,
    #[serde(default)]
    pub app_port: Option<u16>,
}

/// A host about to be inserted; the store assigns `id` and `version`.
#[derive(Debug, Clone)]
pub struct NewHost {
    pub project_id: ProjectId,
    pub name: String,
    pub host_ip: String,
    pub ssh_port: u16,
    pub private_ip: Option<String>,
    pub private_port: Option<u16>,
    pub auth_mode: AuthMode,
    pub username: String,
    pub secret: String,
    pub token: String,
    pub class: HostClass,
    pub app_port: Option<u16>,
    pub last_update_ms: u64,
    pub last_updated_by: Option<UserId>,
}

/// A created host plus the command that installs its agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedHost {
    pub host: HostView,
    pub install_command: String,
}

/// Zero-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub size: usize,
}

fn default_page_size() -> usize {
    20
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: default_page_size() }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_elements: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Cut `items` down to the requested page. A zero size is treated as one.
    pub fn slice(items: Vec<T>, request: PageRequest) -> Self {
        let size = request.size.max(1);
        let total_elements = items.len();
        let content = items.into_iter().skip(request.page.saturating_mul(size)).take(size).collect();
        Self {
            content,
            page: request.page,
            size,
            total_elements,
            total_pages: total_elements.div_ceil(size),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}
