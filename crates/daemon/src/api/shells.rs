//! Shell create/get (`SPEC_FULL.md` §4.9-4.10). The shell-stream
//! WebSocket itself lives in `crate::ws::shell_stream`; this module only
//! covers the plain HTTP create/get surface.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::Response,
};
use hack_core::{
  ids::{ProjectId, ShellId},
  shell::CreateShellRequest,
};
use hack_shell::{CreateShellParams, ShellError};

use crate::{
  error::{ApiError, ApiResult},
  routes::json_response,
  state::AppState,
};

pub async fn create(
  State(state): State<Arc<AppState>>,
  Path(project_id): Path<ProjectId>,
  axum::Json(body): axum::Json<CreateShellRequest>,
) -> ApiResult<Response> {
  let project = state.resolve_project(project_id).await?;
  let session = state
    .shells
    .create_shell(CreateShellParams {
      project_root: project.repo_root.clone(),
      cwd: body.cwd,
      env: body.env,
      shell: body.shell,
      cols: body.cols,
      rows: body.rows,
      project_id: Some(project_id),
      project_name: Some(project.name.clone()),
    })
    .await
    .map_err(map_shell_error)?;

  Ok(json_response(StatusCode::CREATED, &session.meta()))
}

pub async fn get(
  State(state): State<Arc<AppState>>,
  Path((project_id, shell_id)): Path<(ProjectId, ShellId)>,
) -> ApiResult<Response> {
  state.resolve_project(project_id).await?;
  let meta = state
    .shells
    .meta(shell_id)
    .await
    .ok_or(hack_core::Error::NotFound)?;
  Ok(json_response(StatusCode::OK, &meta))
}

fn map_shell_error(e: ShellError) -> ApiError {
  match e {
    ShellError::InvalidCwd => {
      hack_core::Error::validation_with_code("invalid_cwd", "cwd escapes project root")
        .into()
    }
    ShellError::Pty(msg) | ShellError::Spawn(msg) => {
      hack_core::Error::Other(anyhow::anyhow!(msg)).into()
    }
  }
}
