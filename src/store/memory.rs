//! In-process host store and deployment reference registry.

use async_trait::async_trait;
use dashmap::DashSet;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

use crate::host::model::{Host, HostId, NewHost, ProjectId};
use crate::host::status::HostStatus;
use crate::store::{DeploymentRefs, HostStore, StoreError};

#[derive(Default)]
struct Table {
    next_id: HostId,
    rows: BTreeMap<HostId, Host>,
}

/// Host store backed by an ordered map.
///
/// Uniqueness checks and the version compare-and-swap run under one lock, so
/// they behave like the constraints of the relational store.
#[derive(Default)]
pub struct InMemoryHostStore {
    table: Mutex<Table>,
}

impl InMemoryHostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored hosts.
    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn check_unique(table: &Table, candidate: &Host) -> Result<(), StoreError> {
    for row in table.rows.values() {
        if row.id == candidate.id || row.project_id != candidate.project_id {
            continue;
        }
        if row.name == candidate.name {
            return Err(StoreError::Duplicate(format!("host name {}", candidate.name)));
        }
        if row.host_ip == candidate.host_ip && row.ssh_port == candidate.ssh_port {
            return Err(StoreError::Duplicate(format!(
                "host address {}:{}",
                candidate.host_ip, candidate.ssh_port
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl HostStore for InMemoryHostStore {
    async fn insert(&self, new: NewHost) -> Result<Host, StoreError> {
        let mut table = self.table.lock().await;
        let host = Host {
            project_id: new.project_id,
            id: table.next_id + 1,
            name: new.name,
            host_ip: new.host_ip,
            ssh_port: new.ssh_port,
            private_ip: new.private_ip,
            private_port: new.private_port,
            auth_mode: new.auth_mode,
            username: new.username,
            secret: new.secret,
            token: new.token,
            class: new.class,
            app_port: new.app_port,
            status: HostStatus::INITIAL,
            check_error: None,
            occupied: false,
            version: 1,
            last_update_ms: new.last_update_ms,
            last_updated_by: new.last_updated_by,
        };
        check_unique(&table, &host)?;
        table.next_id = host.id;
        table.rows.insert(host.id, host.clone());
        Ok(host)
    }

    async fn get(&self, id: HostId) -> Result<Option<Host>, StoreError> {
        Ok(self.table.lock().await.rows.get(&id).cloned())
    }

    async fn list_by_project(
        &self,
        project_id: ProjectId,
        search: Option<&str>,
    ) -> Result<Vec<Host>, StoreError> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .filter(|h| h.project_id == project_id && h.matches_search(search))
            .cloned()
            .collect())
    }

    async fn list_by_ids(
        &self,
        project_id: ProjectId,
        ids: &BTreeSet<HostId>,
    ) -> Result<Vec<Host>, StoreError> {
        let table = self.table.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| table.rows.get(id))
            .filter(|h| h.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn find_by_name(&self, project_id: ProjectId, name: &str) -> Result<Option<Host>, StoreError> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .find(|h| h.project_id == project_id && h.name == name)
            .cloned())
    }

    async fn find_by_address(
        &self,
        project_id: ProjectId,
        host_ip: &str,
        ssh_port: u16,
    ) -> Result<Option<Host>, StoreError> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .find(|h| h.project_id == project_id && h.host_ip == host_ip && h.ssh_port == ssh_port)
            .cloned())
    }

    async fn update(&self, host: &Host) -> Result<Host, StoreError> {
        let mut table = self.table.lock().await;
        let current_version = match table.rows.get(&host.id) {
            Some(current) => current.version,
            None => return Err(StoreError::NotFound(host.id)),
        };
        if current_version != host.version {
            return Err(StoreError::StaleVersion {
                id: host.id,
                expected: host.version,
                actual: current_version,
            });
        }
        check_unique(&table, host)?;

        let mut stored = host.clone();
        stored.version += 1;
        table.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: HostId) -> Result<bool, StoreError> {
        Ok(self.table.lock().await.rows.remove(&id).is_some())
    }
}

/// Deployment references held in memory; stands in for the pipeline job store.
#[derive(Default)]
pub struct InMemoryDeploymentRefs {
    refs: DashSet<(ProjectId, HostId)>,
}

impl InMemoryDeploymentRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a deployment job in `project_id` targets `host_id`.
    pub fn reference(&self, project_id: ProjectId, host_id: HostId) {
        self.refs.insert((project_id, host_id));
    }

    pub fn release(&self, project_id: ProjectId, host_id: HostId) {
        self.refs.remove(&(project_id, host_id));
    }
}

#[async_trait]
impl DeploymentRefs for InMemoryDeploymentRefs {
    async fn is_referenced(&self, project_id: ProjectId, host_id: HostId) -> Result<bool, StoreError> {
        Ok(self.refs.contains(&(project_id, host_id)))
    }
}
