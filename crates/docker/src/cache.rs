use std::{
  collections::BTreeMap,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
  time::Duration,
};

use arc_swap::ArcSwapOption;
use hack_core::{
  runtime::{RuntimeContainer, RuntimeProject, RuntimeService, RuntimeSnapshot},
  time::now_ms,
};
use hack_storage::ProjectRegistry;

use crate::{client::DockerClient, compose};

/// Debounced, coalesced snapshot of observed compose projects and their
/// containers. Readers never block on Docker: they read the latest
/// swapped-in snapshot, triggering a blocking refresh only if none
/// exists yet.
pub struct RuntimeCache {
  client: DockerClient,
  registry: Arc<ProjectRegistry>,
  snapshot: ArcSwapOption<RuntimeSnapshot>,
  refresh_lock: tokio::sync::Mutex<()>,
  pending: AtomicBool,
  refresh_count: AtomicU64,
  debounce_generation: AtomicU64,
}

impl RuntimeCache {
  pub fn new(client: DockerClient, registry: Arc<ProjectRegistry>) -> Self {
    Self {
      client,
      registry,
      snapshot: ArcSwapOption::empty(),
      refresh_lock: tokio::sync::Mutex::new(()),
      pending: AtomicBool::new(false),
      refresh_count: AtomicU64::new(0),
      debounce_generation: AtomicU64::new(0),
    }
  }

  pub fn snapshot(&self) -> Option<Arc<RuntimeSnapshot>> {
    self.snapshot.load_full()
  }

  pub fn refresh_count(&self) -> u64 {
    self.refresh_count.load(Ordering::SeqCst)
  }

  /// Returns the current snapshot, running a blocking refresh first if
  /// none has ever been produced.
  pub async fn snapshot_or_refresh(&self) -> Arc<RuntimeSnapshot> {
    if let Some(snapshot) = self.snapshot() {
      return snapshot;
    }
    self.refresh("first-reader").await;
    self
      .snapshot()
      .unwrap_or_else(|| Arc::new(RuntimeSnapshot::default()))
  }

  /// Coalesces concurrent refresh requests: a caller that arrives while
  /// a refresh is already running marks `pending` and waits for it,
  /// then triggers at most one more refresh rather than one per caller.
  pub async fn refresh(&self, reason: &str) {
    match self.refresh_lock.try_lock() {
      Ok(guard) => {
        self.do_refresh(reason, guard).await;
      }
      Err(_) => {
        self.pending.store(true, Ordering::SeqCst);
        let guard = self.refresh_lock.lock().await;
        if self.pending.swap(false, Ordering::SeqCst) {
          self
            .do_refresh(&format!("pending:{reason}"), guard)
            .await;
        }
      }
    }
  }

  async fn do_refresh(
    &self,
    reason: &str,
    _guard: tokio::sync::MutexGuard<'_, ()>,
  ) {
    tracing::debug!(reason, "refreshing runtime snapshot");
    match self.build_snapshot().await {
      Ok(snapshot) => {
        self.snapshot.store(Some(Arc::new(snapshot)));
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
      }
      Err(e) => {
        tracing::warn!(error = %e, "runtime snapshot refresh failed");
      }
    }
  }

  async fn build_snapshot(&self) -> anyhow::Result<RuntimeSnapshot> {
    let compose_projects = compose::list_compose_projects().await?;
    let mut projects = Vec::with_capacity(compose_projects.len());

    for cp in compose_projects {
      let containers =
        compose::list_project_containers(&self.client, &cp.name)
          .await
          .unwrap_or_default();

      let mut services: BTreeMap<String, RuntimeService> =
        BTreeMap::new();
      for container in containers {
        let Some(service) = compose::service_name(&container) else {
          continue;
        };
        services.entry(service).or_default().containers.push(
          RuntimeContainer {
            id: container.id.clone().unwrap_or_default(),
            name: compose::container_name(&container),
            state: container.state.clone().unwrap_or_default(),
            status: container.status.clone().unwrap_or_default(),
            ports: compose::container_ports(&container),
          },
        );
      }

      let working_dir = if cp.working_dir.is_empty() {
        None
      } else {
        Some(cp.working_dir.clone())
      };

      if let Some(dir) = &working_dir {
        self.maybe_auto_register(&cp.name, dir).await;
      }

      // Docker alone carries no signal for "this stack is a global,
      // not-project-scoped deployment" (e.g. a shared reverse proxy run
      // outside any tracked repo) -- that classification depends on the
      // CLI's project-discovery heuristics, which are out of scope here.
      // Always reporting `false` keeps such stacks visible by default
      // rather than silently hidden behind `include_global`.
      projects.push(RuntimeProject {
        compose_project_name: cp.name,
        working_dir,
        is_global: false,
        services,
      });
    }

    Ok(RuntimeSnapshot {
      updated_at_ms: now_ms(),
      projects,
    })
  }

  /// A compose project is a recognized hack project when its working
  /// directory contains a `.hack/hack.config.json` marker. Recognized
  /// projects are auto-registered (or touched) in the shared registry,
  /// with `projectDir` pointed at the `.hack` subdirectory so the
  /// daemon's own state never lands inside the user's tree proper.
  async fn maybe_auto_register(
    &self,
    compose_project_name: &str,
    working_dir: &str,
  ) {
    let repo_root = std::path::PathBuf::from(working_dir);
    let project_dir = repo_root.join(".hack");
    if !tokio::fs::try_exists(project_dir.join("hack.config.json"))
      .await
      .unwrap_or(false)
    {
      return;
    }

    let name = slugify(compose_project_name);
    if let Err(e) = self
      .registry
      .upsert(&name, repo_root, project_dir)
      .await
    {
      tracing::warn!(error = %e, project = %name, "auto-registration failed");
    }
  }

  pub fn on_docker_event(self: &Arc<Self>) {
    let generation =
      self.debounce_generation.fetch_add(1, Ordering::SeqCst) + 1;
    let this = self.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(250)).await;
      if this.debounce_generation.load(Ordering::SeqCst) == generation {
        this.refresh("docker-event").await;
      }
    });
  }
}

/// Lowercases and hyphenates a compose project name into a valid
/// project-registry slug.
pub fn slugify(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  let mut last_was_hyphen = true;
  for ch in input.chars() {
    if ch.is_ascii_alphanumeric() {
      out.push(ch.to_ascii_lowercase());
      last_was_hyphen = false;
    } else if !last_was_hyphen {
      out.push('-');
      last_was_hyphen = true;
    }
  }
  out.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slugify_collapses_separators() {
    assert_eq!(slugify("My Cool Project"), "my-cool-project");
    assert_eq!(slugify("already-a-slug"), "already-a-slug");
    assert_eq!(slugify("weird__chars!!"), "weird-chars");
  }
}
