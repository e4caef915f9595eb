//! Host management operations around the reconciliation engine.
//!
//! # Responsibilities
//! - Create, edit, delete and look up hosts with validation and uniqueness checks
//! - Run the lazy timeout sweep on every read path
//! - Direct, synchronous connection tests
//!
//! # Design Decisions
//! - Edits always restart the status cycle (`Edited` → `operating`)
//! - Uniqueness is re-checked on edit only for fields that changed
//! - Deleting an absent host is a no-op; deleting a referenced one is refused

use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::host::install;
use crate::host::model::{
    unix_millis, CreateHostRequest, CreatedHost, Host, HostClass, HostId, HostView, NewHost, Page,
    PageRequest, ProjectId, UpdateHostRequest, UserId,
};
use crate::host::status::{HostStatus, StatusEvent};
use crate::host::validation::{validate_create, validate_update, FieldError};
use crate::probe::{run_probe, ConnectionParams, ConnectionTestResult};
use crate::reconcile::{BatchCorrector, ReconcileError};
use crate::resilience::retries::RetryPolicy;
use crate::store::{update_with_retry, DeploymentRefs, HostStore, StoreError, UpdateOutcome};

/// Errors returned by host operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host {0} not found")]
    NotFound(HostId),

    #[error("host {id} belongs to another project than {project_id}")]
    WrongProject { id: HostId, project_id: ProjectId },

    #[error("invalid host: {}", join_fields(.0))]
    Invalid(Vec<FieldError>),

    #[error("host name {0} already exists in this project")]
    DuplicateName(String),

    #[error("host address {ip}:{port} already exists in this project")]
    DuplicateAddress { ip: String, port: u16 },

    #[error("host {0} is referenced by a deployment job")]
    Referenced(HostId),

    #[error("host {id} is not a {expected} host")]
    WrongClass { id: HostId, expected: &'static str },

    #[error("no hosts matched the selection")]
    EmptySelection,

    #[error("install token does not match host {0}")]
    TokenMismatch(HostId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Host management facade used by the HTTP layer.
#[derive(Clone)]
pub struct HostService {
    store: Arc<dyn HostStore>,
    refs: Arc<dyn DeploymentRefs>,
    engine: BatchCorrector,
}

impl HostService {
    pub fn new(store: Arc<dyn HostStore>, refs: Arc<dyn DeploymentRefs>, engine: BatchCorrector) -> Self {
        Self { store, refs, engine }
    }

    pub fn engine(&self) -> &BatchCorrector {
        &self.engine
    }

    /// Agent install command for a host.
    pub fn install_command(&self, project_id: ProjectId, host: &Host) -> String {
        install::install_command(&self.engine.config().agent, project_id, host)
    }

    /// Install script for a host, handed out only against the host's token.
    ///
    /// Unknown hosts, foreign projects and wrong tokens all read as not found.
    pub async fn install_script(&self, project_id: ProjectId, id: HostId, token: &str) -> Result<String, HostError> {
        let host = match self.store.get(id).await? {
            Some(host) if host.project_id == project_id => host,
            _ => return Err(HostError::NotFound(id)),
        };
        if host.token != token {
            tracing::warn!(project_id, host_id = id, "Install script requested with a wrong token");
            return Err(HostError::TokenMismatch(id));
        }
        Ok(install::render_install_script(&self.engine.config().agent, project_id, &host))
    }

    pub async fn create_host(
        &self,
        project_id: ProjectId,
        req: CreateHostRequest,
        actor: Option<UserId>,
    ) -> Result<CreatedHost, HostError> {
        validate_create(&req).map_err(HostError::Invalid)?;
        let name = req.name.trim().to_string();
        if !self.is_name_unique(project_id, &name).await? {
            return Err(HostError::DuplicateName(name));
        }
        if !self.is_ssh_ip_port_unique(project_id, &req.host_ip, req.ssh_port).await? {
            return Err(HostError::DuplicateAddress { ip: req.host_ip, port: req.ssh_port });
        }

        let host = self
            .store
            .insert(NewHost {
                project_id,
                name,
                host_ip: req.host_ip,
                ssh_port: req.ssh_port,
                private_ip: req.private_ip.filter(|ip| !ip.is_empty()),
                private_port: req.private_port,
                auth_mode: req.auth_mode,
                username: req.username,
                secret: req.secret,
                token: Uuid::new_v4().simple().to_string(),
                class: req.class,
                app_port: req.app_port,
                last_update_ms: unix_millis(),
                last_updated_by: actor,
            })
            .await?;

        tracing::info!(project_id, host_id = host.id, class = host.class.as_str(), "Host created");
        Ok(CreatedHost {
            install_command: self.install_command(project_id, &host),
            host: HostView::from(&host),
        })
    }

    pub async fn update_host(
        &self,
        project_id: ProjectId,
        id: HostId,
        req: UpdateHostRequest,
        actor: Option<UserId>,
    ) -> Result<HostView, HostError> {
        let current = self.owned_host(project_id, id).await?;
        validate_update(&req, current.class).map_err(HostError::Invalid)?;

        let name = req.name.trim().to_string();
        if current.name != name && !self.is_name_unique(project_id, &name).await? {
            return Err(HostError::DuplicateName(name));
        }
        let address_changed = current.host_ip != req.host_ip || current.ssh_port != req.ssh_port;
        if address_changed && !self.is_ssh_ip_port_unique(project_id, &req.host_ip, req.ssh_port).await? {
            return Err(HostError::DuplicateAddress { ip: req.host_ip, port: req.ssh_port });
        }

        let policy = RetryPolicy::from_config(&self.engine.config().reconcile);
        let now = unix_millis();
        let outcome = update_with_retry(self.store.as_ref(), id, &policy, |h| {
            h.name = name.clone();
            h.host_ip = req.host_ip.clone();
            h.ssh_port = req.ssh_port;
            h.private_ip = req.private_ip.clone().filter(|ip| !ip.is_empty());
            h.private_port = req.private_port;
            h.auth_mode = req.auth_mode;
            h.username = req.username.clone();
            h.secret = req.secret.clone();
            h.app_port = req.app_port;
            h.status = h.status.apply(StatusEvent::Edited).unwrap_or(HostStatus::Operating);
            h.check_error = None;
            h.touch(actor, now);
            true
        })
        .await?;

        match outcome {
            UpdateOutcome::Updated(host) | UpdateOutcome::Skipped(host) => {
                tracing::info!(project_id, host_id = id, "Host updated, status reset to operating");
                Ok(HostView::from(&host))
            }
            UpdateOutcome::Missing => Err(HostError::NotFound(id)),
        }
    }

    pub async fn delete_host(&self, project_id: ProjectId, id: HostId) -> Result<(), HostError> {
        let Some(host) = self.store.get(id).await? else {
            return Ok(());
        };
        if host.project_id != project_id {
            return Err(HostError::WrongProject { id, project_id });
        }
        if self.refs.is_referenced(project_id, id).await? {
            return Err(HostError::Referenced(id));
        }
        self.store.delete(id).await?;
        tracing::info!(project_id, host_id = id, "Host deleted");
        Ok(())
    }

    /// A host of the project, after sweeping it. `None` if absent or foreign.
    pub async fn query_host(&self, project_id: ProjectId, id: HostId) -> Result<Option<HostView>, HostError> {
        match self.store.get(id).await? {
            Some(host) if host.project_id == project_id => {
                self.engine.sweeper().sweep(project_id, std::slice::from_ref(&host));
                Ok(Some(HostView::from(&host)))
            }
            _ => Ok(None),
        }
    }

    pub async fn list_hosts(
        &self,
        project_id: ProjectId,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<HostView>, HostError> {
        let hosts = self.store.list_by_project(project_id, search).await?;
        Ok(self.sweep_page(project_id, hosts, page))
    }

    /// Listing restricted to the hosts of a live correction batch.
    ///
    /// Falls back to the plain listing when the key is absent, expired or empty.
    pub async fn page_with_checking_status(
        &self,
        project_id: ProjectId,
        correct_key: Option<&str>,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<HostView>, HostError> {
        let batch_ids = match correct_key.filter(|k| !k.is_empty()) {
            Some(key) => self.engine.batch_host_ids(key).await?.filter(|ids| !ids.is_empty()),
            None => None,
        };
        let Some(ids) = batch_ids else {
            return self.list_hosts(project_id, search, page).await;
        };

        let hosts = self
            .store
            .list_by_ids(project_id, &ids)
            .await?
            .into_iter()
            .filter(|h| h.matches_search(search))
            .collect();
        Ok(self.sweep_page(project_id, hosts, page))
    }

    fn sweep_page(&self, project_id: ProjectId, hosts: Vec<Host>, page: PageRequest) -> Page<HostView> {
        let page = Page::slice(hosts, page);
        self.engine.sweeper().sweep(project_id, &page.content);
        page.map(|h| HostView::from(&h))
    }

    pub async fn is_name_unique(&self, project_id: ProjectId, name: &str) -> Result<bool, HostError> {
        Ok(self.store.find_by_name(project_id, name).await?.is_none())
    }

    pub async fn is_ssh_ip_port_unique(&self, project_id: ProjectId, ip: &str, ssh_port: u16) -> Result<bool, HostError> {
        Ok(self.store.find_by_address(project_id, ip, ssh_port).await?.is_none())
    }

    /// Probe arbitrary connection parameters now.
    pub async fn test_connection(&self, params: &ConnectionParams) -> ConnectionTestResult {
        let report = run_probe(self.engine.prober().as_ref(), params).await;
        ConnectionTestResult::from(&report)
    }

    /// Probe a stored deploy host now, without touching its status.
    pub async fn test_connection_for_deploy_host(
        &self,
        project_id: ProjectId,
        id: HostId,
    ) -> Result<ConnectionTestResult, HostError> {
        let host = self.owned_host(project_id, id).await?;
        if host.class != HostClass::Deploy {
            return Err(HostError::WrongClass { id, expected: HostClass::Deploy.as_str() });
        }
        Ok(self.test_connection(&host.connection_params()).await)
    }

    /// Probe every listed host of the project; returns the ids that failed.
    pub async fn multi_test_connection(
        &self,
        project_id: ProjectId,
        ids: &BTreeSet<HostId>,
    ) -> Result<BTreeSet<HostId>, HostError> {
        let hosts = self.store.list_by_ids(project_id, ids).await?;
        if hosts.is_empty() {
            return Err(HostError::EmptySelection);
        }

        let mut failed = BTreeSet::new();
        for host in hosts {
            if !self.test_connection(&host.connection_params()).await.passed {
                failed.insert(host.id);
            }
        }
        Ok(failed)
    }

    async fn owned_host(&self, project_id: ProjectId, id: HostId) -> Result<Host, HostError> {
        let host = self.store.get(id).await?.ok_or(HostError::NotFound(id))?;
        if host.project_id != project_id {
            return Err(HostError::WrongProject { id, project_id });
        }
        Ok(host)
    }
}
