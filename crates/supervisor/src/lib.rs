//! Job orchestration (`SPEC_FULL.md` §4.8). Grounded directly on
//! `runner.rs`'s `run_job` (the background task that drives one job to a
//! terminal status) and `running.rs`'s `RunningJobs` map; this module is the
//! public surface the daemon's job routes call into: `createJob`,
//! `cancelJob`, `getJob`, `listJobs`.

mod runner;
mod running;

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use hack_core::{
  ids::{JobId, ProjectId},
  job::{JobMeta, JobStatus},
};
use hack_storage::JobStore;
use nix::{sys::signal::Signal, unistd::Pid};
use thiserror::Error;
use tokio::sync::Semaphore;

pub use runner::RunJobParams;
pub use running::{RunningJob, RunningJobs};

/// How long `cancelJob` waits for the `SIGTERM`ed process to exit before
/// escalating to `SIGKILL`, per §4.8's 3s grace period.
const CANCEL_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum SupervisorError {
  #[error("job not found")]
  NotFound,
  #[error("job is not running")]
  NotRunning,
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct CreateJobParams {
  pub project_dir: PathBuf,
  pub project_id: Option<ProjectId>,
  pub project_name: Option<String>,
  pub command: Vec<String>,
  pub env: HashMap<String, String>,
  pub cwd: Option<PathBuf>,
}

/// One per daemon. `max_concurrent_jobs` is enforced globally through a
/// shared semaphore; `logs_max_bytes` is forwarded to every spawned run so
/// its log-truncation stays in lockstep with the configured limit.
pub struct Supervisor {
  running: Arc<RunningJobs>,
  semaphore: Arc<Semaphore>,
  logs_max_bytes: u64,
}

impl Supervisor {
  pub fn new(max_concurrent_jobs: usize, logs_max_bytes: u64) -> Self {
    Self {
      running: Arc::new(RunningJobs::default()),
      semaphore: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
      logs_max_bytes,
    }
  }

  /// Writes `queued` meta, then spawns the runner in the background and
  /// returns immediately with that meta — callers observe progress by
  /// reading the job store, not by awaiting completion.
  pub async fn create_job(
    &self,
    params: CreateJobParams,
  ) -> anyhow::Result<JobMeta> {
    let store = JobStore::new(params.project_dir.clone());
    let meta = store
      .create_job(
        params.command.clone(),
        params.project_id,
        params.project_name.clone(),
      )
      .await?;

    let run_params = RunJobParams {
      job_id: meta.job_id,
      project_dir: params.project_dir,
      project_id: params.project_id,
      project_name: params.project_name,
      command: params.command,
      env: params.env,
      cwd: params.cwd,
    };
    let running = self.running.clone();
    let semaphore = self.semaphore.clone();
    let logs_max_bytes = self.logs_max_bytes;
    tokio::spawn(async move {
      runner::run_job(run_params, running, semaphore, logs_max_bytes).await;
    });

    Ok(meta)
  }

  pub async fn get_job(
    &self,
    project_dir: &Path,
    job_id: JobId,
  ) -> anyhow::Result<Option<JobMeta>> {
    JobStore::new(project_dir.to_path_buf())
      .read_job_meta(job_id)
      .await
  }

  pub async fn list_jobs(
    &self,
    project_dir: &Path,
  ) -> anyhow::Result<Vec<JobMeta>> {
    JobStore::new(project_dir.to_path_buf()).list_jobs().await
  }

  /// 404s if the job is unknown, 409s if it isn't in the running map;
  /// otherwise sends `SIGTERM`, marks the job `cancelled` immediately (the
  /// runner's own exit-time re-check sees this and reports the run as
  /// cancelled rather than completed/failed), and escalates to `SIGKILL`
  /// if the process is still running after [`CANCEL_GRACE`].
  pub async fn cancel_job(
    &self,
    project_dir: &Path,
    job_id: JobId,
  ) -> Result<JobMeta, SupervisorError> {
    let store = JobStore::new(project_dir.to_path_buf());
    store
      .read_job_meta(job_id)
      .await?
      .ok_or(SupervisorError::NotFound)?;

    let Some(running_job) = self.running.get(&job_id).await else {
      return Err(SupervisorError::NotRunning);
    };

    send_signal(running_job.pid, Signal::SIGTERM);

    let running = self.running.clone();
    tokio::spawn(async move {
      tokio::time::sleep(CANCEL_GRACE).await;
      if running.get(&job_id).await.is_some() {
        send_signal(running_job.pid, Signal::SIGKILL);
      }
    });

    store.append_event(job_id, "job.cancelled", None).await?;
    let updated = store
      .update_job_status(job_id, JobStatus::Cancelled, None, None)
      .await?;
    Ok(updated)
  }
}

fn send_signal(pid: u32, signal: Signal) {
  if let Err(e) = nix::sys::signal::kill(Pid::from_raw(pid as i32), signal) {
    tracing::warn!(%pid, ?signal, error = %e, "failed to signal job process");
  }
}

#[cfg(test)]
mod tests {
  use hack_core::ids::JobId;

  use super::*;

  #[tokio::test]
  async fn create_job_spawns_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(4, 0);
    let meta = supervisor
      .create_job(CreateJobParams {
        project_dir: dir.path().to_path_buf(),
        project_id: None,
        project_name: None,
        command: vec!["echo".into(), "hello".into()],
        env: HashMap::new(),
        cwd: None,
      })
      .await
      .unwrap();
    assert_eq!(meta.status, JobStatus::Queued);

    for _ in 0..100 {
      if let Some(updated) =
        supervisor.get_job(dir.path(), meta.job_id).await.unwrap()
        && updated.status.is_terminal()
      {
        assert_eq!(updated.status, JobStatus::Completed);
        return;
      }
      tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job did not complete in time");
  }

  #[tokio::test]
  async fn cancel_job_unknown_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(4, 0);
    let err = supervisor
      .cancel_job(dir.path(), JobId::new())
      .await
      .unwrap_err();
    assert!(matches!(err, SupervisorError::NotFound));
  }

  #[tokio::test]
  async fn cancel_job_not_running_is_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(4, 0);
    let meta = supervisor
      .create_job(CreateJobParams {
        project_dir: dir.path().to_path_buf(),
        project_id: None,
        project_name: None,
        command: vec!["echo".into(), "hello".into()],
        env: HashMap::new(),
        cwd: None,
      })
      .await
      .unwrap();
    // Give the job a moment to finish and drop out of the running map.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let err = supervisor
      .cancel_job(dir.path(), meta.job_id)
      .await
      .unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning));
  }

  #[tokio::test]
  async fn cancel_job_while_running_marks_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(4, 0);
    let meta = supervisor
      .create_job(CreateJobParams {
        project_dir: dir.path().to_path_buf(),
        project_id: None,
        project_name: None,
        command: vec!["sleep".into(), "5".into()],
        env: HashMap::new(),
        cwd: None,
      })
      .await
      .unwrap();

    // Wait until the runner registers it as running.
    for _ in 0..100 {
      if supervisor.running.get(&meta.job_id).await.is_some() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let updated = supervisor.cancel_job(dir.path(), meta.job_id).await.unwrap();
    assert_eq!(updated.status, JobStatus::Cancelled);

    let events = JobStore::new(dir.path().to_path_buf())
      .read_events(meta.job_id)
      .await
      .unwrap();
    assert!(events.iter().any(|e| e.kind == "job.cancelled"));
  }
}
