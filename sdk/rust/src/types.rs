use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostView {
    pub project_id: u64,
    pub id: u64,
    pub name: String,
    pub host_ip: String,
    pub ssh_port: u16,
    pub private_ip: Option<String>,
    pub private_port: Option<u16>,
    pub auth_mode: String,
    pub username: String,
    pub class: String,
    pub app_port: Option<u16>,
    /// `operating`, `success` or `failed`.
    pub status: String,
    pub check_error: Option<String>,
    pub occupied: bool,
    pub version: u64,
    pub last_update_ms: u64,
    pub last_updated_by: Option<u64>,
}

/// Body for creating a host. `class` is `deploy` or `test`, `auth_mode` is `password` or `key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHost {
    pub name: String,
    pub class: String,
    pub host_ip: String,
    pub ssh_port: u16,
    pub private_ip: Option<String>,
    pub private_port: Option<u16>,
    pub auth_mode: String,
    pub username: String,
    pub secret: String,
    pub app_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateHost {
    pub name: String,
    pub host_ip: String,
    pub ssh_port: u16,
    pub private_ip: Option<String>,
    pub private_port: Option<u16>,
    pub auth_mode: String,
    pub username: String,
    pub secret: String,
    pub app_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedHost {
    pub host: HostView,
    pub install_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_elements: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host_ip: String,
    pub ssh_port: u16,
    pub auth_mode: String,
    pub username: String,
    pub secret: String,
    pub class: String,
    pub app_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionTestResult {
    pub passed: bool,
    pub ssh_ok: bool,
    pub app_ok: Option<bool>,
    pub error: Option<String>,
}

/// Aggregate progress of a correction batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckingProgress {
    /// `checking`, `success`, `failed` or `unknown`.
    pub status: String,
    /// Percentage of successful entries, two decimals.
    pub progress: f64,
}

impl CheckingProgress {
    pub fn is_terminal(&self) -> bool {
        self.status != "checking"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectKey {
    pub correct_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
