//! `GET /v1/projects` and `GET /v1/ps` (`SPEC_FULL.md` §4.10). Both read
//! straight from the runtime cache — never touching Docker themselves —
//! and are the one place the gateway's response-filtering rule (§4.11
//! point 5) narrows what the local-API handler already computed.

use std::sync::Arc;

use axum::{
  extract::{Extension, Query, State},
  http::StatusCode,
  response::Response,
};
use hack_docker::{ProjectsFilter, get_projects_payload, get_ps_payload};
use serde::Deserialize;

use crate::{
  error::ApiResult, gateway::GatewayContext, routes::json_response,
  state::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectsQuery {
  pub filter: Option<String>,
  pub include_global: bool,
  pub include_unregistered: bool,
}

/// `GET /v1/projects`. Under the gateway, `include_unregistered` is
/// forced off and the joined view is further narrowed to projects whose
/// id is in the cached `enabledProjects` set, per §4.11 point 5.
pub async fn list_projects(
  State(state): State<Arc<AppState>>,
  Query(query): Query<ProjectsQuery>,
  gateway: Option<Extension<GatewayContext>>,
) -> ApiResult<Response> {
  let snapshot = state.docker.snapshot_or_refresh().await;
  let opts = ProjectsFilter {
    filter: query.filter,
    include_global: query.include_global,
    include_unregistered: gateway.is_none() && query.include_unregistered,
  };
  let mut payload =
    get_projects_payload(&snapshot, &state.registry, &opts).await?;

  if gateway.is_some() {
    let enabled = state.enabled_projects.read().await;
    payload
      .projects
      .retain(|p| p.project_id.is_some_and(|id| enabled.contains(&id)));
  }

  Ok(json_response(StatusCode::OK, &payload))
}

#[derive(Debug, Deserialize)]
pub struct PsQuery {
  pub compose_project: String,
  /// Accepted for wire compatibility with the spec's query shape; the
  /// runtime snapshot has no per-project/branch split to filter by.
  #[allow(dead_code)]
  #[serde(default)]
  pub project: Option<String>,
  #[allow(dead_code)]
  #[serde(default)]
  pub branch: Option<String>,
}

/// `GET /v1/ps?compose_project=...`.
pub async fn ps(
  State(state): State<Arc<AppState>>,
  Query(query): Query<PsQuery>,
) -> ApiResult<Response> {
  let snapshot = state.docker.snapshot_or_refresh().await;
  let payload = get_ps_payload(&snapshot, &query.compose_project);
  Ok(json_response(StatusCode::OK, &payload))
}
