use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Response};
use hack_core::time::now_ms;
use serde::Serialize;

use crate::{routes::json_response, state::AppState};

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
struct StatusResponse {
  status: &'static str,
  version: &'static str,
  pid: u32,
  started_at: i64,
  uptime_ms: i64,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Response {
  let started_at = state.metrics.started_at_ms();
  json_response(
    StatusCode::OK,
    &StatusResponse {
      status: "ok",
      version: crate::state::VERSION,
      pid: std::process::id(),
      started_at,
      uptime_ms: (now_ms() - started_at).max(0),
    },
  )
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
  let snapshot = state.docker.snapshot();
  let cache_updated_at = snapshot.map(|s| s.updated_at_ms);
  let refresh_count = state.docker.refresh_count();
  json_response(
    StatusCode::OK,
    &state.metrics.snapshot(cache_updated_at, refresh_count),
  )
}
