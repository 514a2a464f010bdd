use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ids::ProjectId;

/// A registered hack-level project: a developer workspace with a stable
/// id, a unique name, and a `hack.config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
  pub id: ProjectId,
  /// Unique, case-folded ASCII slug.
  pub name: String,
  pub repo_root: PathBuf,
  pub project_dir: PathBuf,
  pub created_at: i64,
  pub last_seen_at: i64,
}

/// On-disk shape of `~/.hack/projects.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectsRegistryFile {
  pub projects: Vec<ProjectRecord>,
}

/// Outcome of [`upsert`][crate::project] against the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpsertOutcome {
  Inserted { project: ProjectRecord },
  Updated { project: ProjectRecord },
  /// `name` already maps to a different `project_dir`; the existing
  /// entry is preserved untouched.
  Conflict { project: ProjectRecord },
}
