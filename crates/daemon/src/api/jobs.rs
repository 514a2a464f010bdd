//! Job CRUD + cancel (`SPEC_FULL.md` §4.7-4.8, §4.10). Thin HTTP
//! wrapper over `hack_supervisor::Supervisor`; all the state lives in
//! the per-project job store, this module only resolves the project,
//! gets (or lazily creates) that project's supervisor, and translates.

use std::{path::PathBuf, sync::Arc};

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::Response,
};
use hack_core::{
  ids::{JobId, ProjectId},
  job::{CreateJobRequest, JobsListResponse},
};
use hack_supervisor::{CreateJobParams, SupervisorError};

use crate::{
  error::{ApiError, ApiResult},
  routes::json_response,
  state::AppState,
};

/// Resolves a job's `cwd` against the project's `repo_root` — the
/// developer's actual checkout, not the hidden `.hack/` state directory
/// a job's own store lives under.
fn resolve_cwd(repo_root: &std::path::Path, cwd: Option<String>) -> Option<PathBuf> {
  cwd.map(|c| {
    let p = PathBuf::from(&c);
    if p.is_absolute() { p } else { repo_root.join(p) }
  })
}

pub async fn create(
  State(state): State<Arc<AppState>>,
  Path(project_id): Path<ProjectId>,
  axum::Json(body): axum::Json<CreateJobRequest>,
) -> ApiResult<Response> {
  let project = state.resolve_project(project_id).await?;
  let config = state.effective_config(&project)?;
  let supervisor =
    state.supervisors.get_or_create(project_id, &config).await;

  let cwd = resolve_cwd(&project.repo_root, body.cwd);
  let meta = supervisor
    .create_job(CreateJobParams {
      project_dir: project.project_dir.clone(),
      project_id: Some(project_id),
      project_name: Some(project.name.clone()),
      command: body.command,
      env: body.env,
      cwd,
    })
    .await?;

  Ok(json_response(StatusCode::CREATED, &meta))
}

pub async fn list(
  State(state): State<Arc<AppState>>,
  Path(project_id): Path<ProjectId>,
) -> ApiResult<Response> {
  let project = state.resolve_project(project_id).await?;
  let config = state.effective_config(&project)?;
  let supervisor =
    state.supervisors.get_or_create(project_id, &config).await;
  let jobs = supervisor.list_jobs(&project.project_dir).await?;
  Ok(json_response(StatusCode::OK, &JobsListResponse { jobs }))
}

pub async fn get(
  State(state): State<Arc<AppState>>,
  Path((project_id, job_id)): Path<(ProjectId, JobId)>,
) -> ApiResult<Response> {
  let project = state.resolve_project(project_id).await?;
  let config = state.effective_config(&project)?;
  let supervisor =
    state.supervisors.get_or_create(project_id, &config).await;
  let meta = supervisor
    .get_job(&project.project_dir, job_id)
    .await?
    .ok_or(hack_core::Error::NotFound)?;
  Ok(json_response(StatusCode::OK, &meta))
}

pub async fn cancel(
  State(state): State<Arc<AppState>>,
  Path((project_id, job_id)): Path<(ProjectId, JobId)>,
) -> ApiResult<Response> {
  let project = state.resolve_project(project_id).await?;
  let config = state.effective_config(&project)?;
  let supervisor =
    state.supervisors.get_or_create(project_id, &config).await;
  let meta = supervisor
    .cancel_job(&project.project_dir, job_id)
    .await
    .map_err(map_supervisor_error)?;
  Ok(json_response(StatusCode::OK, &meta))
}

fn map_supervisor_error(e: SupervisorError) -> ApiError {
  match e {
    SupervisorError::NotFound => hack_core::Error::NotFound.into(),
    SupervisorError::NotRunning => {
      hack_core::Error::Conflict("job is not running".to_string()).into()
    }
    SupervisorError::Other(e) => hack_core::Error::Other(e).into(),
  }
}
