use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeSet;

use crate::types::*;

/// Non-success response from the API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "API returned {} ({}): {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiFailure {}

pub type ClientResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub struct HostClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    user_id: Option<u64>,
}

impl HostClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            user_id: None,
        }
    }

    /// Send `Authorization: Bearer {key}` with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Send `x-user-id` with every request.
    pub fn user_id(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    fn hosts_url(&self, project_id: u64, suffix: &str) -> String {
        format!("{}/v1/projects/{}/hosts{}", self.base_url, project_id, suffix)
    }

    fn prepare(&self, mut req: RequestBuilder) -> RequestBuilder {
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(user_id) = self.user_id {
            req = req.header("x-user-id", user_id.to_string());
        }
        req
    }

    async fn send(&self, req: RequestBuilder) -> ClientResult<Response> {
        let resp = self.prepare(req).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await?;
        let failure = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => ApiFailure { status: status.as_u16(), code: body.code, message: body.message },
            Err(_) => ApiFailure { status: status.as_u16(), code: "unknown".into(), message: text },
        };
        Err(failure.into())
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> ClientResult<T> {
        Ok(self.send(req).await?.json::<T>().await?)
    }

    pub async fn health(&self) -> ClientResult<serde_json::Value> {
        self.send_json(self.client.get(format!("{}/health", self.base_url))).await
    }

    pub async fn create_host(&self, project_id: u64, req: &CreateHost) -> ClientResult<CreatedHost> {
        self.send_json(self.client.post(self.hosts_url(project_id, "")).json(req)).await
    }

    pub async fn list_hosts(
        &self,
        project_id: u64,
        search: Option<&str>,
        page: usize,
        size: usize,
    ) -> ClientResult<Page<HostView>> {
        let mut query = vec![("page", page.to_string()), ("size", size.to_string())];
        if let Some(search) = search {
            query.push(("search", search.to_string()));
        }
        self.send_json(self.client.get(self.hosts_url(project_id, "")).query(&query)).await
    }

    pub async fn get_host(&self, project_id: u64, id: u64) -> ClientResult<HostView> {
        self.send_json(self.client.get(self.hosts_url(project_id, &format!("/{id}")))).await
    }

    pub async fn update_host(&self, project_id: u64, id: u64, req: &UpdateHost) -> ClientResult<HostView> {
        self.send_json(self.client.put(self.hosts_url(project_id, &format!("/{id}"))).json(req)).await
    }

    pub async fn delete_host(&self, project_id: u64, id: u64) -> ClientResult<()> {
        self.send(self.client.delete(self.hosts_url(project_id, &format!("/{id}")))).await?;
        Ok(())
    }

    pub async fn batch_set_operating(&self, project_id: u64, ids: &BTreeSet<u64>) -> ClientResult<BTreeSet<u64>> {
        self.post_ids(project_id, "/batch_set_operating", ids).await
    }

    /// Start a background correction; returns the ids that were selected.
    pub async fn correct(&self, project_id: u64, ids: &BTreeSet<u64>) -> ClientResult<BTreeSet<u64>> {
        self.post_ids(project_id, "/correct", ids).await
    }

    /// Start a tracked correction; returns its correlation key.
    pub async fn correct_with_progress(&self, project_id: u64, ids: &BTreeSet<u64>) -> ClientResult<String> {
        let key: CorrectKey = self.post_ids(project_id, "/correct_with_progress", ids).await?;
        Ok(key.correct_key)
    }

    pub async fn checking_progress(&self, project_id: u64, correct_key: &str) -> ClientResult<CheckingProgress> {
        let req = self
            .client
            .get(self.hosts_url(project_id, "/checking_progress"))
            .query(&[("correct_key", correct_key)]);
        self.send_json(req).await
    }

    pub async fn paging_with_checking_status(
        &self,
        project_id: u64,
        correct_key: Option<&str>,
        search: Option<&str>,
    ) -> ClientResult<Page<HostView>> {
        let mut query = Vec::new();
        if let Some(key) = correct_key {
            query.push(("correct_key", key));
        }
        if let Some(search) = search {
            query.push(("search", search));
        }
        let req = self
            .client
            .get(self.hosts_url(project_id, "/paging_with_checking_status"))
            .query(&query);
        self.send_json(req).await
    }

    pub async fn connection_test(&self, project_id: u64, params: &ConnectionParams) -> ClientResult<ConnectionTestResult> {
        self.send_json(self.client.post(self.hosts_url(project_id, "/connection_test")).json(params)).await
    }

    /// Returns the ids whose test failed.
    pub async fn multi_connection_test(&self, project_id: u64, ids: &BTreeSet<u64>) -> ClientResult<BTreeSet<u64>> {
        self.post_ids(project_id, "/multi_connection_test", ids).await
    }

    pub async fn deploy_host_connection_test(&self, project_id: u64, id: u64) -> ClientResult<ConnectionTestResult> {
        self.send_json(self.client.get(self.hosts_url(project_id, &format!("/{id}/connection_test")))).await
    }

    /// Fetch the agent install script of a host. Needs the host token, not an API key.
    pub async fn install_script(&self, project_id: u64, id: u64, token: &str) -> ClientResult<String> {
        let url = self.hosts_url(project_id, &format!("/{id}/download_file/{token}"));
        Ok(self.send(self.client.get(url)).await?.text().await?)
    }

    pub async fn name_unique(&self, project_id: u64, name: &str) -> ClientResult<bool> {
        let req = self
            .client
            .get(self.hosts_url(project_id, "/check/name_unique"))
            .query(&[("name", name)]);
        self.send_json(req).await
    }

    pub async fn ip_unique(&self, project_id: u64, ip: &str, ssh_port: u16) -> ClientResult<bool> {
        let req = self
            .client
            .get(self.hosts_url(project_id, "/check/ip_unique"))
            .query(&[("ip", ip.to_string()), ("ssh_port", ssh_port.to_string())]);
        self.send_json(req).await
    }

    async fn post_ids<T: DeserializeOwned>(&self, project_id: u64, suffix: &str, ids: &BTreeSet<u64>) -> ClientResult<T> {
        self.send_json(self.client.post(self.hosts_url(project_id, suffix)).json(&json!({ "host_ids": ids })))
            .await
    }
}

