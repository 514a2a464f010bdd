//! The TCP-reachable face of the daemon (`SPEC_FULL.md` §4.11). Grounded
//! on `bin/core/src/auth/mod.rs`'s `middleware::from_fn` auth layer: the
//! gateway is not a second route table, it is [`crate::routes::build_router`]
//! wrapped in one more [`axum::middleware::from_fn_with_state`] layer
//! that authenticates, authorizes, and audits before handing the request
//! to the exact same handlers the Unix-socket listener uses.

use std::{net::SocketAddr, sync::Arc};

use axum::{
  extract::{ConnectInfo, Request, State},
  http::{HeaderMap, Method, StatusCode, header},
  middleware::Next,
  response::Response,
};
use hack_core::{
  audit::AuditEntry,
  ids::{ProjectId, TokenId},
  time::now_ms,
  token::TokenRecord,
};
use hack_storage::sanitize_path;

use crate::{routes::json_response, state::AppState};

/// Inserted into request extensions once a gateway request authenticates
/// successfully, so downstream handlers (currently only
/// `GET /v1/projects`) can tell they're serving a remote, narrowed view.
#[derive(Clone)]
pub struct GatewayContext {
  pub token_id: TokenId,
}

/// `axum::middleware::from_fn_with_state` layer bound to the gateway's
/// TCP listener only. Never applied to the Unix-socket router.
pub async fn auth_and_audit(
  State(state): State<Arc<AppState>>,
  ConnectInfo(addr): ConnectInfo<SocketAddr>,
  req: Request,
  next: Next,
) -> Response {
  let method = req.method().clone();
  let path = req.uri().path().to_string();
  let raw_query = req.uri().query().unwrap_or("").to_string();
  let sanitized_path = sanitize_path(&match req.uri().query() {
    Some(q) => format!("{path}?{q}"),
    None => path.clone(),
  });
  let user_agent = req
    .headers()
    .get(header::USER_AGENT)
    .and_then(|v| v.to_str().ok())
    .map(str::to_string);
  let remote_address = Some(addr.to_string());

  let (response, token_id) = match authenticate(&state, req.headers(), &raw_query, is_upgrade(req.headers())).await {
    Ok(token) => {
      let token_id = token.id;
      match authorize(&state, &token, &method, &path, is_upgrade(req.headers())).await {
        Ok(()) => {
          let mut req = req;
          req.extensions_mut().insert(GatewayContext { token_id });
          (next.run(req).await, Some(token_id))
        }
        Err(err) => (err, Some(token_id)),
      }
    }
    Err(err) => (err, None),
  };

  state
    .audit
    .append(&AuditEntry {
      ts: now_ms(),
      method: method.to_string(),
      path: sanitized_path,
      status: response.status().as_u16(),
      token_id,
      remote_address,
      user_agent,
    })
    .await;

  response
}

async fn authenticate(
  state: &AppState,
  headers: &HeaderMap,
  raw_query: &str,
  allow_query_token: bool,
) -> Result<TokenRecord, Response> {
  let Some(secret) = extract_bearer(headers, raw_query, allow_query_token)
  else {
    return Err(error_response(
      StatusCode::UNAUTHORIZED,
      "missing_token",
    ));
  };

  match state.tokens.verify(&secret).await {
    Ok(Some(record)) => Ok(record),
    Ok(None) => Err(error_response(StatusCode::UNAUTHORIZED, "invalid_token")),
    Err(e) => {
      tracing::error!(error = %e, "token verification failed");
      Err(error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
      ))
    }
  }
}

async fn authorize(
  state: &AppState,
  token: &TokenRecord,
  method: &Method,
  path: &str,
  is_upgrade: bool,
) -> Result<(), Response> {
  if let Some(project_id) = extract_project_id(path) {
    let enabled = state.enabled_projects.read().await;
    if !enabled.contains(&project_id) {
      return Err(error_response(StatusCode::FORBIDDEN, "project_disabled"));
    }
  }

  if !is_write_request(method, path, is_upgrade) {
    return Ok(());
  }

  if !state.global_config.gateway.allow_writes {
    return Err(error_response(StatusCode::FORBIDDEN, "writes_disabled"));
  }
  if token.scope != hack_core::token::TokenScope::Write {
    return Err(error_response(
      StatusCode::FORBIDDEN,
      "write_scope_required",
    ));
  }
  Ok(())
}

/// Bearer extraction per §4.11 point 1: `Authorization: Bearer ...` or
/// `X-Hack-Token: ...` always; the `token`/`access_token` query
/// parameter only for WebSocket upgrade requests.
fn extract_bearer(
  headers: &HeaderMap,
  raw_query: &str,
  allow_query_token: bool,
) -> Option<String> {
  if let Some(value) = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
  {
    if let Some(token) = value.strip_prefix("Bearer ") {
      return Some(token.to_string());
    }
  }
  if let Some(value) =
    headers.get("x-hack-token").and_then(|v| v.to_str().ok())
  {
    return Some(value.to_string());
  }
  if allow_query_token {
    for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
      if key == "token" || key == "access_token" {
        return Some(value.into_owned());
      }
    }
  }
  None
}

fn is_upgrade(headers: &HeaderMap) -> bool {
  headers
    .get(header::UPGRADE)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Shell-stream WebSocket upgrades are always treated as writes, per
/// §4.11 point 4 ("interactive input == mutation"). Everything else
/// follows the plain GET/HEAD-is-read-only rule.
fn is_write_request(method: &Method, path: &str, is_upgrade: bool) -> bool {
  if is_upgrade && path.contains("/shells/") && path.ends_with("/stream") {
    return true;
  }
  !(method == Method::GET || method == Method::HEAD)
}

/// Parses `<projectId>` out of a `/control-plane/projects/<projectId>/...`
/// path. Paths outside that prefix (e.g. `/v1/status`) have no project
/// to gate on.
fn extract_project_id(path: &str) -> Option<ProjectId> {
  let rest = path.strip_prefix("/control-plane/projects/")?;
  let segment = rest.split('/').next()?;
  segment.parse().ok()
}

fn error_response(status: StatusCode, code: &'static str) -> Response {
  json_response(status, &serde_json::json!({ "error": code }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_project_id_from_control_plane_path() {
    let id = ProjectId::new();
    let path = format!("/control-plane/projects/{id}/jobs");
    assert_eq!(extract_project_id(&path), Some(id));
  }

  #[test]
  fn non_control_plane_path_has_no_project() {
    assert_eq!(extract_project_id("/v1/status"), None);
  }

  #[test]
  fn get_is_read_only_except_shell_stream_upgrade() {
    assert!(!is_write_request(&Method::GET, "/v1/status", false));
    assert!(!is_write_request(
      &Method::GET,
      "/control-plane/projects/x/jobs/y/stream",
      true
    ));
    assert!(is_write_request(
      &Method::GET,
      "/control-plane/projects/x/shells/y/stream",
      true
    ));
    assert!(is_write_request(&Method::POST, "/control-plane/x", false));
  }
}
