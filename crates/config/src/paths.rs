use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};

/// Resolves the per-user `hack` state layout, following the teacher's
/// `KOMODO_*`-prefixed env-override convention but scoped to `HACK_*`
/// (see `SPEC_FULL.md` §4.1).
#[derive(Debug, Clone)]
pub struct HackPaths {
  /// `~/.hack`, holding the global config and the shared project registry.
  pub hack_home: PathBuf,
  /// `~/.hack/daemon`, owned exclusively by the daemon. Overridable via
  /// `HACK_STATE_ROOT`.
  pub daemon_root: PathBuf,
}

impl HackPaths {
  /// `--state-root` wins over `HACK_STATE_ROOT`, which wins over the
  /// default `~/.hack/daemon`.
  pub fn resolve(state_root_override: Option<PathBuf>) -> anyhow::Result<Self> {
    let home = dirs::home_dir()
      .ok_or_else(|| anyhow!("could not resolve home directory"))?;
    let hack_home = home.join(".hack");
    let daemon_root = state_root_override
      .or_else(|| std::env::var_os("HACK_STATE_ROOT").map(PathBuf::from))
      .unwrap_or_else(|| hack_home.join("daemon"));
    Ok(Self {
      hack_home,
      daemon_root,
    })
  }

  pub fn with_home(hack_home: impl Into<PathBuf>) -> Self {
    let hack_home = hack_home.into();
    Self {
      daemon_root: hack_home.join("daemon"),
      hack_home,
    }
  }

  pub fn global_config_file(&self) -> PathBuf {
    self.hack_home.join("hack.config.json")
  }

  pub fn registry_file(&self) -> PathBuf {
    self.hack_home.join("projects.json")
  }

  pub fn socket_path(&self) -> PathBuf {
    self.daemon_root.join("hackd.sock")
  }

  pub fn pid_file(&self) -> PathBuf {
    self.daemon_root.join("hackd.pid")
  }

  pub fn log_file(&self) -> PathBuf {
    self.daemon_root.join("hackd.log")
  }

  pub fn gateway_dir(&self) -> PathBuf {
    self.daemon_root.join("gateway")
  }

  pub fn tokens_file(&self) -> PathBuf {
    self.gateway_dir().join("tokens.json")
  }

  pub fn audit_file(&self) -> PathBuf {
    self.gateway_dir().join("audit.jsonl")
  }

  pub fn cloudflare_pid_file(&self) -> PathBuf {
    self.hack_home.join("cloudflare").join("cloudflared.pid")
  }

  pub fn project_config_file(project_dir: &Path) -> PathBuf {
    project_dir.join("hack.config.json")
  }

  pub fn project_jobs_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("supervisor").join("jobs")
  }

  pub fn job_dir(project_dir: &Path, job_id: &str) -> PathBuf {
    Self::project_jobs_dir(project_dir).join(job_id)
  }

  /// Creates the daemon-owned directories if missing. Does not touch
  /// `hack_home` itself — the registry file's directory is assumed to
  /// already exist (created by the CLI on first project registration).
  pub fn ensure_daemon_dirs(&self) -> anyhow::Result<()> {
    std::fs::create_dir_all(&self.daemon_root)
      .with_context(|| {
        format!("failed to create {}", self.daemon_root.display())
      })?;
    std::fs::create_dir_all(self.gateway_dir()).with_context(|| {
      format!("failed to create {}", self.gateway_dir().display())
    })?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn layout_matches_spec() {
    let paths = HackPaths::with_home("/home/dev/.hack");
    assert_eq!(
      paths.daemon_root,
      PathBuf::from("/home/dev/.hack/daemon")
    );
    assert_eq!(
      paths.socket_path(),
      PathBuf::from("/home/dev/.hack/daemon/hackd.sock")
    );
    assert_eq!(
      paths.tokens_file(),
      PathBuf::from("/home/dev/.hack/daemon/gateway/tokens.json")
    );
    assert_eq!(
      paths.registry_file(),
      PathBuf::from("/home/dev/.hack/projects.json")
    );
  }

  #[test]
  fn ensure_daemon_dirs_creates_gateway_subdir() {
    let dir = tempfile::tempdir().unwrap();
    let paths = HackPaths::with_home(dir.path());
    paths.ensure_daemon_dirs().unwrap();
    assert!(paths.gateway_dir().is_dir());
  }
}
