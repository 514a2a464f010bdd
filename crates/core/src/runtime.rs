use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::ProjectId;

/// Immutable, fully-replaced-on-refresh view of observed compose
/// projects. Sole source of truth for `/v1/projects` and `/v1/ps`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
  pub updated_at_ms: i64,
  pub projects: Vec<RuntimeProject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeProject {
  pub compose_project_name: String,
  pub working_dir: Option<String>,
  /// Whether this compose project is a "global", not-project-scoped
  /// deployment (e.g. shared infrastructure running outside any tracked
  /// repo) rather than one belonging to a specific hack project. Distinct
  /// from [`ProjectView::registered`], which tracks registry membership.
  pub is_global: bool,
  pub services: BTreeMap<String, RuntimeService>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeService {
  pub containers: Vec<RuntimeContainer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeContainer {
  pub id: String,
  pub name: String,
  pub state: String,
  pub status: String,
  pub ports: Vec<RuntimePort>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimePort {
  pub private_port: u16,
  pub public_port: Option<u16>,
  pub protocol: String,
}

/// A joined view of registry + runtime snapshot for one project, as
/// served by `GET /v1/projects`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectView {
  pub project_id: Option<ProjectId>,
  pub name: Option<String>,
  pub compose_project_name: String,
  pub working_dir: Option<String>,
  pub is_global: bool,
  pub registered: bool,
  pub services: BTreeMap<String, RuntimeService>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectsPayload {
  pub updated_at_ms: i64,
  pub projects: Vec<ProjectView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PsPayload {
  pub compose_project: String,
  pub containers: Vec<PsContainer>,
}

/// One row of `GET /v1/ps`: `(service, name)`-sorted container entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsContainer {
  pub service: String,
  pub name: String,
  pub id: String,
  pub state: String,
  pub status: String,
  pub ports: Vec<RuntimePort>,
}
