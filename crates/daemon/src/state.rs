//! Shared daemon state, constructed once in `main` and handed to every
//! handler behind `Arc<AppState>`. Per `SPEC_FULL.md` §9's "ambient module
//! state" note, nothing here is a global/static — it is all passed through
//! construction, replacing the teacher's module-level singletons.

use std::{collections::HashSet, sync::Arc};

use cache::CloneCache;
use hack_config::HackPaths;
use hack_core::{
  config::HackConfig,
  ids::ProjectId,
  project::ProjectRecord,
  time::now_ms,
};
use hack_docker::RuntimeCache;
use hack_shell::ShellService;
use hack_storage::{AuditLog, ProjectRegistry, TokenStore};
use hack_supervisor::Supervisor;
use tokio::sync::RwLock;

use crate::{error::ApiError, metrics::Metrics};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lazily builds one [`Supervisor`] per project, sized from that project's
/// effective `supervisor.*` config (global merged with its
/// `hack.config.json`). Project configs can differ in
/// `maxConcurrentJobs`/`logsMaxBytes`, so one global supervisor would not
/// honor per-project overrides.
#[derive(Default)]
pub struct SupervisorPool {
  by_project: CloneCache<ProjectId, Arc<Supervisor>>,
}

impl SupervisorPool {
  pub async fn get_or_create(
    &self,
    project_id: ProjectId,
    config: &HackConfig,
  ) -> Arc<Supervisor> {
    if let Some(existing) = self.by_project.get(&project_id).await {
      return existing;
    }
    let supervisor = Arc::new(Supervisor::new(
      config.supervisor.max_concurrent_jobs,
      config.supervisor.logs_max_bytes,
    ));
    self.by_project.insert(project_id, supervisor.clone()).await;
    supervisor
  }
}

pub struct AppState {
  pub paths: HackPaths,
  pub global_config: HackConfig,
  pub registry: Arc<ProjectRegistry>,
  pub tokens: Arc<TokenStore>,
  pub audit: Arc<AuditLog>,
  pub docker: Arc<RuntimeCache>,
  pub supervisors: SupervisorPool,
  pub shells: Arc<ShellService>,
  pub metrics: Arc<Metrics>,
  /// `projectId`s whose `gateway.enabled` resolved `true` at startup;
  /// gates gateway access to `/control-plane/projects/<projectId>/...`.
  pub enabled_projects: RwLock<HashSet<ProjectId>>,
}

impl AppState {
  pub fn new(
    paths: HackPaths,
    global_config: HackConfig,
    registry: Arc<ProjectRegistry>,
    tokens: Arc<TokenStore>,
    audit: Arc<AuditLog>,
    docker: Arc<RuntimeCache>,
  ) -> Self {
    Self {
      paths,
      global_config,
      registry,
      tokens,
      audit,
      docker,
      supervisors: SupervisorPool::default(),
      shells: Arc::new(ShellService::new()),
      metrics: Arc::new(Metrics::new(now_ms())),
      enabled_projects: RwLock::new(HashSet::new()),
    }
  }

  /// Resolves a path's `<projectId>` to its registry record, 404ing if
  /// unknown to any handler that needs a project's on-disk directory.
  pub async fn resolve_project(
    &self,
    project_id: ProjectId,
  ) -> Result<ProjectRecord, ApiError> {
    self
      .registry
      .resolve_by_id(project_id)
      .await?
      .ok_or_else(|| ApiError(hack_core::Error::NotFound))
  }

  pub fn effective_config(
    &self,
    project: &ProjectRecord,
  ) -> anyhow::Result<HackConfig> {
    Ok(hack_config::load_effective(
      &self.paths,
      Some(&project.project_dir),
    )?)
  }

  /// Recomputes `enabled_projects` from the registry × each project's
  /// effective `gateway.enabled`. Failures to read one project's config
  /// are logged and that project is simply left disabled, per §7's
  /// "warnings are logged but never fatal".
  pub async fn refresh_enabled_projects(&self) {
    let mut enabled = HashSet::new();
    let projects = match self.registry.list().await {
      Ok(projects) => projects,
      Err(e) => {
        tracing::warn!(error = %e, "failed to list registry for gateway enablement");
        *self.enabled_projects.write().await = enabled;
        return;
      }
    };
    for project in projects {
      match self.effective_config(&project) {
        Ok(config) if config.gateway.enabled => {
          enabled.insert(project.id);
        }
        Ok(_) => {}
        Err(e) => {
          tracing::warn!(error = %e, project = %project.name, "failed to resolve effective config");
        }
      }
    }
    *self.enabled_projects.write().await = enabled;
  }
}
