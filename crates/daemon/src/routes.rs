//! Builds the single route table shared verbatim by the local Unix-socket
//! listener and the gateway's TCP listener, per `SPEC_FULL.md` §4.11 point
//! 6 ("gateway... must not duplicate the route table").

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{StatusCode, header},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::Serialize;

use crate::{
  api,
  state::AppState,
  ws,
};

pub fn build_router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/v1/status", get(api::status::status))
    .route("/v1/metrics", get(api::status::metrics))
    .route("/v1/projects", get(api::projects::list_projects))
    .route("/v1/ps", get(api::projects::ps))
    .route(
      "/control-plane/projects/{projectId}/jobs",
      get(api::jobs::list).post(api::jobs::create),
    )
    .route(
      "/control-plane/projects/{projectId}/jobs/{jobId}",
      get(api::jobs::get),
    )
    .route(
      "/control-plane/projects/{projectId}/jobs/{jobId}/cancel",
      post(api::jobs::cancel),
    )
    .route(
      "/control-plane/projects/{projectId}/jobs/{jobId}/stream",
      get(ws::job_stream::upgrade),
    )
    .route(
      "/control-plane/projects/{projectId}/shells",
      post(api::shells::create),
    )
    .route(
      "/control-plane/projects/{projectId}/shells/{shellId}",
      get(api::shells::get),
    )
    .route(
      "/control-plane/projects/{projectId}/shells/{shellId}/stream",
      get(ws::shell_stream::upgrade),
    )
    .fallback(not_found)
    .with_state(state)
}

async fn not_found() -> Response {
  json_response(
    StatusCode::NOT_FOUND,
    &serde_json::json!({ "error": "not_found" }),
  )
}

/// Pretty-printed JSON (2-space indent, trailing newline) with an
/// accurate `content-length`, per `SPEC_FULL.md` §6's wire-format note.
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
  match hack_storage::atomic::pretty_json(value) {
    Ok(body) => {
      let len = body.len();
      (
        status,
        [
          (header::CONTENT_TYPE, "application/json".to_string()),
          (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from(body),
      )
        .into_response()
    }
    Err(e) => {
      tracing::error!(error = %e, "failed to serialize response body");
      StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
  }
}
