//! Host agent install command and script.

use crate::config::schema::AgentConfig;
use crate::host::model::{Host, ProjectId};

/// Shell script served to a host that runs its install command.
const INSTALL_SCRIPT_TEMPLATE: &str = r#"#!/bin/sh
# Host agent installer for host {host_id} of project {project_id}.
set -e

AGENT_DIR="${AGENT_DIR:-/opt/host-agent}"
mkdir -p "$AGENT_DIR"

curl -fsSL -o "$AGENT_DIR/host-agent" "{binary_url}"
chmod +x "$AGENT_DIR/host-agent"

cat > "$AGENT_DIR/agent.conf" <<CONF
api_url={api_url}
project_id={project_id}
host_id={host_id}
token={token}
CONF
chmod 600 "$AGENT_DIR/agent.conf"

nohup "$AGENT_DIR/host-agent" --config "$AGENT_DIR/agent.conf" >> "$AGENT_DIR/agent.log" 2>&1 &
echo "host agent started for host {host_id}"
"#;

/// Path of the install script download, relative to the API base URL.
pub fn download_path(project_id: ProjectId, host: &Host) -> String {
    format!("/v1/projects/{}/hosts/{}/download_file/{}", project_id, host.id, host.token)
}

/// One-liner an operator runs on the host to install the agent.
pub fn install_command(agent: &AgentConfig, project_id: ProjectId, host: &Host) -> String {
    format!(
        "curl -o host.sh {}{} && sh host.sh",
        agent.download_api_url.trim_end_matches('/'),
        download_path(project_id, host)
    )
}

/// The install script for `host`, with its connection settings filled in.
pub fn render_install_script(agent: &AgentConfig, project_id: ProjectId, host: &Host) -> String {
    INSTALL_SCRIPT_TEMPLATE
        .replace("{api_url}", agent.download_api_url.trim_end_matches('/'))
        .replace("{binary_url}", &agent.binary_url)
        .replace("{project_id}", &project_id.to_string())
        .replace("{host_id}", &host.id.to_string())
        .replace("{token}", &host.token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::model::{AuthMode, HostClass};
    use crate::host::status::HostStatus;

    fn host() -> Host {
        Host {
            project_id: 3,
            id: 12,
            name: "runner".into(),
            host_ip: "10.0.0.12".into(),
            ssh_port: 22,
            private_ip: None,
            private_port: None,
            auth_mode: AuthMode::Password,
            username: "root".into(),
            secret: "pw".into(),
            token: "0123abcd".into(),
            class: HostClass::Test,
            app_port: Some(1099),
            status: HostStatus::Operating,
            check_error: None,
            occupied: false,
            version: 1,
            last_update_ms: 0,
            last_updated_by: None,
        }
    }

    fn agent() -> AgentConfig {
        AgentConfig {
            download_api_url: "https://devops.example.com/".into(),
            binary_url: "https://mirror.example.com/host-agent".into(),
        }
    }

    #[test]
    fn test_install_command_points_at_download_route() {
        assert_eq!(
            install_command(&agent(), 3, &host()),
            "curl -o host.sh https://devops.example.com/v1/projects/3/hosts/12/download_file/0123abcd && sh host.sh"
        );
    }

    #[test]
    fn test_script_is_rendered_for_host() {
        let script = render_install_script(&agent(), 3, &host());
        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains("api_url=https://devops.example.com\n"));
        assert!(script.contains("host_id=12\n"));
        assert!(script.contains("token=0123abcd\n"));
        assert!(script.contains("\"https://mirror.example.com/host-agent\""));
        // Shell expansions survive rendering.
        assert!(script.contains("${AGENT_DIR:-/opt/host-agent}"));
        assert!(!script.contains("{token}"));
    }
}
