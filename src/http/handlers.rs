//! Handlers for `/v1/projects/{project_id}/hosts`.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::host::model::{
    CreateHostRequest, CreatedHost, HostId, HostView, Page, PageRequest, ProjectId, UpdateHostRequest,
};
use crate::http::error::ApiError;
use crate::http::middleware::Actor;
use crate::http::server::AppState;
use crate::probe::{ConnectionParams, ConnectionTestResult};
use crate::reconcile::CheckingProgress;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct HostIdsBody {
    pub host_ids: BTreeSet<HostId>,
}

#[derive(Debug, Serialize)]
pub struct CorrectKeyResponse {
    pub correct_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
    pub correct_key: Option<String>,
}

impl ListQuery {
    fn page_request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest {
            page: self.page.unwrap_or(defaults.page),
            size: self.size.unwrap_or(defaults.size),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub correct_key: String,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub ip: String,
    pub ssh_port: u16,
}

pub async fn get_health() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn create_host(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Actor(actor): Actor,
    Json(req): Json<CreateHostRequest>,
) -> Result<(StatusCode, Json<CreatedHost>), ApiError> {
    let created = state.service.create_host(project_id, req, actor).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_hosts(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<HostView>>, ApiError> {
    let page = state
        .service
        .list_hosts(project_id, query.search.as_deref(), query.page_request())
        .await?;
    Ok(Json(page))
}

pub async fn query_host(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(ProjectId, HostId)>,
) -> Result<Json<HostView>, ApiError> {
    state
        .service
        .query_host(project_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("host {id} not found")))
}

pub async fn update_host(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(ProjectId, HostId)>,
    Actor(actor): Actor,
    Json(req): Json<UpdateHostRequest>,
) -> Result<Json<HostView>, ApiError> {
    Ok(Json(state.service.update_host(project_id, id, req, actor).await?))
}

pub async fn delete_host(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(ProjectId, HostId)>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_host(project_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn batch_set_operating(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Actor(actor): Actor,
    Json(body): Json<HostIdsBody>,
) -> Result<Json<BTreeSet<HostId>>, ApiError> {
    let selected = state
        .service
        .engine()
        .batch_set_operating(project_id, &body.host_ids, actor)
        .await?;
    Ok(Json(selected.into_iter().map(|h| h.id).collect()))
}

pub async fn correct(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Actor(actor): Actor,
    Json(body): Json<HostIdsBody>,
) -> Result<Json<BTreeSet<HostId>>, ApiError> {
    let selected = state
        .service
        .engine()
        .request_correction(project_id, &body.host_ids, actor)
        .await?;
    Ok(Json(selected))
}

pub async fn correct_with_progress(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Actor(actor): Actor,
    Json(body): Json<HostIdsBody>,
) -> Result<Json<CorrectKeyResponse>, ApiError> {
    let correct_key = state
        .service
        .engine()
        .request_correction_with_progress(project_id, &body.host_ids, actor)
        .await?;
    Ok(Json(CorrectKeyResponse { correct_key }))
}

pub async fn checking_progress(
    State(state): State<AppState>,
    Path(_project_id): Path<ProjectId>,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<CheckingProgress>, ApiError> {
    Ok(Json(state.service.engine().checking_progress(&query.correct_key).await?))
}

pub async fn paging_with_checking_status(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<HostView>>, ApiError> {
    let page = state
        .service
        .page_with_checking_status(
            project_id,
            query.correct_key.as_deref(),
            query.search.as_deref(),
            query.page_request(),
        )
        .await?;
    Ok(Json(page))
}

pub async fn connection_test(
    State(state): State<AppState>,
    Path(_project_id): Path<ProjectId>,
    Json(params): Json<ConnectionParams>,
) -> Json<ConnectionTestResult> {
    Json(state.service.test_connection(&params).await)
}

pub async fn multi_connection_test(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<HostIdsBody>,
) -> Result<Json<BTreeSet<HostId>>, ApiError> {
    Ok(Json(state.service.multi_test_connection(project_id, &body.host_ids).await?))
}

pub async fn deploy_host_connection_test(
    State(state): State<AppState>,
    Path((project_id, id)): Path<(ProjectId, HostId)>,
) -> Result<Json<ConnectionTestResult>, ApiError> {
    Ok(Json(state.service.test_connection_for_deploy_host(project_id, id).await?))
}

/// Install script for the agent. Authenticated by the host token in the path.
pub async fn download_install_script(
    State(state): State<AppState>,
    Path((project_id, id, token)): Path<(ProjectId, HostId, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let script = state.service.install_script(project_id, id, &token).await?;
    Ok(([(header::CONTENT_TYPE, "text/x-shellscript; charset=utf-8")], script))
}

pub async fn name_unique(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<NameQuery>,
) -> Result<Json<bool>, ApiError> {
    Ok(Json(state.service.is_name_unique(project_id, query.name.trim()).await?))
}

pub async fn ip_unique(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<bool>, ApiError> {
    Ok(Json(
        state
            .service
            .is_ssh_ip_port_unique(project_id, &query.ip, query.ssh_port)
            .await?,
    ))
}
