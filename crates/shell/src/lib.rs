//! In-memory PTY-backed shell sessions (`SPEC_FULL.md` §4.9). Grounded on
//! `bin/periphery/src/terminal.rs`'s `PeripheryTerminal`: `native_pty_system()`
//! to open the PTY, blocking read/write tasks bridged onto async channels,
//! and broadcast fanout so more than one attacher can observe the same
//! session. Unlike the teacher (one fixed `stdout` broadcast receiver held
//! by the terminal's owner), sessions here are addressed by `ShellId` and
//! attached to on demand by the daemon's WebSocket bridge.

mod session;

use std::path::{Path, PathBuf};

use cache::CloneCache;
use hack_core::{
  ids::{ProjectId, ShellId},
  shell::{ShellMeta, ShellSignal, ShellStatus},
};
pub use session::{ExitInfo, ShellAttachment, ShellEvent, ShellSession};
use thiserror::Error;

/// How long an exited session is kept around so a late attach can still
/// observe the exit, per the spec's "survives for a short TTL" rule.
const EXITED_RETENTION: std::time::Duration =
  std::time::Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum ShellError {
  #[error("cwd escapes project root")]
  InvalidCwd,
  #[error("failed to open pty: {0}")]
  Pty(String),
  #[error("failed to spawn shell: {0}")]
  Spawn(String),
}

#[derive(Debug, Clone, Default)]
pub struct CreateShellParams {
  pub project_root: PathBuf,
  pub cwd: Option<String>,
  pub env: std::collections::HashMap<String, String>,
  pub shell: Option<String>,
  pub cols: Option<u16>,
  pub rows: Option<u16>,
  pub project_id: Option<ProjectId>,
  pub project_name: Option<String>,
}

/// Resolves `cwd` (if given, else `project_root` itself) against
/// `project_root`, rejecting anything that would land outside it. This is
/// the security invariant from §4.9: shells never escape the project.
pub fn resolve_cwd(
  project_root: &Path,
  cwd: Option<&str>,
) -> Result<PathBuf, ShellError> {
  let candidate = match cwd {
    Some(cwd) if !cwd.is_empty() => {
      let cwd_path = Path::new(cwd);
      if cwd_path.is_absolute() {
        cwd_path.to_path_buf()
      } else {
        project_root.join(cwd_path)
      }
    }
    _ => project_root.to_path_buf(),
  };

  let normalized = normalize(&candidate);
  let root = normalize(project_root);
  if normalized.starts_with(&root) {
    Ok(normalized)
  } else {
    Err(ShellError::InvalidCwd)
  }
}

/// Lexically normalizes `.`/`..` components without touching the
/// filesystem (the directory may not exist yet when a shell is created).
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    use std::path::Component::*;
    match component {
      ParentDir => {
        out.pop();
      }
      CurDir => {}
      other => out.push(other),
    }
  }
  out
}

/// Owns every live (and recently-exited) shell session, keyed by
/// `ShellId`. Mirrors the teacher's global `terminals()` `CloneVecCache`,
/// but keyed for O(1) lookup since shells are addressed individually by
/// WebSocket clients rather than searched by `(target, name)`.
#[derive(Default)]
pub struct ShellService {
  sessions: CloneCache<ShellId, std::sync::Arc<ShellSession>>,
}

impl ShellService {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn create_shell(
    &self,
    params: CreateShellParams,
  ) -> Result<std::sync::Arc<ShellSession>, ShellError> {
    let cwd =
      resolve_cwd(&params.project_root, params.cwd.as_deref())?;
    let shell_id = ShellId::new();
    let session = ShellSession::spawn(
      shell_id,
      cwd,
      params.env,
      params.shell,
      params.cols.unwrap_or(80),
      params.rows.unwrap_or(24),
      params.project_id,
      params.project_name,
    )
    .await?;
    self.sessions.insert(shell_id, session.clone()).await;
    self.schedule_retention(shell_id, session.clone());
    Ok(session)
  }

  pub async fn get(
    &self,
    shell_id: ShellId,
  ) -> Option<std::sync::Arc<ShellSession>> {
    self.sessions.get(&shell_id).await
  }

  pub async fn meta(&self, shell_id: ShellId) -> Option<ShellMeta> {
    let session = self.sessions.get(&shell_id).await?;
    Some(session.meta())
  }

  /// Registers a new attachment to the session's output broadcast and
  /// exit watch. Returns `None` if the session is unknown (either never
  /// existed, or its TTL already expired).
  pub async fn attach(
    &self,
    shell_id: ShellId,
  ) -> Option<ShellAttachment> {
    let session = self.sessions.get(&shell_id).await?;
    Some(session.attach())
  }

  pub async fn close(
    &self,
    shell_id: ShellId,
    signal: Option<ShellSignal>,
  ) -> bool {
    let Some(session) = self.sessions.get(&shell_id).await else {
      return false;
    };
    session.signal(signal.unwrap_or(ShellSignal::Sigterm));
    true
  }

  /// Once a session exits, its entry lingers for [`EXITED_RETENTION`] so
  /// a late attach can still observe the exit, then is dropped from the
  /// map entirely.
  fn schedule_retention(
    &self,
    shell_id: ShellId,
    session: std::sync::Arc<ShellSession>,
  ) {
    let sessions = self.sessions_handle();
    tokio::spawn(async move {
      session.wait_exited().await;
      tokio::time::sleep(EXITED_RETENTION).await;
      sessions.remove(&shell_id).await;
    });
  }

  fn sessions_handle(&self) -> &CloneCache<ShellId, std::sync::Arc<ShellSession>> {
    &self.sessions
  }
}

pub fn status_is_running(meta: &ShellMeta) -> bool {
  meta.status == ShellStatus::Running
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cwd_within_root_is_accepted() {
    let root = PathBuf::from("/home/dev/project");
    let resolved = resolve_cwd(&root, Some("src")).unwrap();
    assert_eq!(resolved, PathBuf::from("/home/dev/project/src"));
  }

  #[test]
  fn cwd_escaping_root_is_rejected() {
    let root = PathBuf::from("/home/dev/project");
    let err = resolve_cwd(&root, Some("../../etc")).unwrap_err();
    assert!(matches!(err, ShellError::InvalidCwd));
  }

  #[test]
  fn absolute_cwd_outside_root_is_rejected() {
    let root = PathBuf::from("/home/dev/project");
    let err = resolve_cwd(&root, Some("/etc/passwd")).unwrap_err();
    assert!(matches!(err, ShellError::InvalidCwd));
  }

  #[test]
  fn missing_cwd_defaults_to_root() {
    let root = PathBuf::from("/home/dev/project");
    let resolved = resolve_cwd(&root, None).unwrap();
    assert_eq!(resolved, root);
  }

  #[test]
  fn dot_dot_that_stays_inside_root_is_accepted() {
    let root = PathBuf::from("/home/dev/project");
    let resolved =
      resolve_cwd(&root, Some("src/../lib")).unwrap();
    assert_eq!(resolved, PathBuf::from("/home/dev/project/lib"));
  }
}
