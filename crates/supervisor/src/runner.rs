use std::{
  collections::HashMap,
  os::unix::process::ExitStatusExt,
  path::PathBuf,
  process::Stdio,
  sync::Arc,
};

use hack_core::{
  ids::{JobId, ProjectId},
  job::JobStatus,
};
use hack_storage::{JobStore, OutputStream};
use tokio::{
  io::{AsyncBufReadExt, BufReader},
  process::Command,
  sync::Semaphore,
};

use crate::running::{RunningJob, RunningJobs};

pub struct RunJobParams {
  pub job_id: JobId,
  pub project_dir: PathBuf,
  pub project_id: Option<ProjectId>,
  pub project_name: Option<String>,
  pub command: Vec<String>,
  pub env: HashMap<String, String>,
  pub cwd: Option<PathBuf>,
}

/// Drives one job from `queued` to a terminal status. Spawned as a
/// detached background task by [`crate::Supervisor::create_job`]; the
/// caller only ever observes it through job-store reads.
pub async fn run_job(
  params: RunJobParams,
  running: Arc<RunningJobs>,
  semaphore: Arc<Semaphore>,
  logs_max_bytes: u64,
) {
  let RunJobParams {
    job_id,
    project_dir,
    command,
    env,
    cwd,
    ..
  } = params;

  let store = JobStore::new(project_dir.clone());

  let _permit = match semaphore.acquire_owned().await {
    Ok(permit) => permit,
    Err(_) => return,
  };

  if let Err(e) = store
    .append_event(job_id, "job.starting", None)
    .await
  {
    tracing::warn!(error = %e, %job_id, "failed to append job.starting");
  }
  if let Err(e) = store
    .update_job_status(job_id, JobStatus::Starting, None, None)
    .await
  {
    tracing::warn!(error = %e, %job_id, "failed to update job status");
    return;
  }

  let Some((command_name, args)) = command.split_first() else {
    fail_to_spawn(&store, job_id, "command cannot be empty").await;
    return;
  };

  let mut cmd = Command::new(command_name);
  cmd
    .args(args)
    .envs(&env)
    .kill_on_drop(true)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
  cmd.current_dir(cwd.unwrap_or(project_dir));

  let mut child = match cmd.spawn() {
    Ok(child) => child,
    Err(e) => {
      fail_to_spawn(&store, job_id, &e.to_string()).await;
      return;
    }
  };

  let Some(pid) = child.id() else {
    fail_to_spawn(&store, job_id, "process exited before pid observed")
      .await;
    return;
  };

  running.insert(job_id, RunningJob { pid }).await;
  let _ = store
    .append_event(
      job_id,
      "job.started",
      Some(serde_json::json!({ "pid": pid })),
    )
    .await;
  let _ = store
    .update_job_status(job_id, JobStatus::Running, Some(pid), None)
    .await;

  let stdout = child.stdout.take().expect("stdout was piped");
  let stderr = child.stderr.take().expect("stderr was piped");

  let stdout_drain = tokio::spawn(drain_stream(
    store.clone(),
    job_id,
    OutputStream::Stdout,
    stdout,
    logs_max_bytes,
  ));
  let stderr_drain = tokio::spawn(drain_stream(
    store.clone(),
    job_id,
    OutputStream::Stderr,
    stderr,
    logs_max_bytes,
  ));

  let status = child.wait().await;
  let _ = stdout_drain.await;
  let _ = stderr_drain.await;
  running.remove(&job_id).await;

  let exit_code = match status {
    Ok(status) => status.code().unwrap_or_else(|| {
      128 + status.signal().unwrap_or(0)
    }),
    Err(_) => 1,
  };

  let already_cancelled = matches!(
    store.read_job_meta(job_id).await,
    Ok(Some(meta)) if meta.status == JobStatus::Cancelled
  );

  if already_cancelled {
    let _ = store
      .update_job_status(
        job_id,
        JobStatus::Cancelled,
        None,
        Some(exit_code),
      )
      .await;
    return;
  }

  let final_status = if exit_code == 0 {
    JobStatus::Completed
  } else {
    JobStatus::Failed
  };
  let event_kind = if exit_code == 0 {
    "job.completed"
  } else {
    "job.failed"
  };

  let _ = store
    .update_job_status(job_id, final_status, None, Some(exit_code))
    .await;
  let _ = store
    .append_event(
      job_id,
      event_kind,
      Some(serde_json::json!({ "exitCode": exit_code })),
    )
    .await;
}

async fn fail_to_spawn(store: &JobStore, job_id: JobId, error: &str) {
  let _ = store
    .append_event(
      job_id,
      "job.failed",
      Some(serde_json::json!({ "error": error })),
    )
    .await;
  let _ = store
    .update_job_status(job_id, JobStatus::Failed, None, Some(1))
    .await;
}

async fn drain_stream(
  store: JobStore,
  job_id: JobId,
  stream: OutputStream,
  reader: impl tokio::io::AsyncRead + Unpin,
  logs_max_bytes: u64,
) {
  let mut lines = BufReader::new(reader).split(b'\n');
  loop {
    match lines.next_segment().await {
      Ok(Some(mut chunk)) => {
        chunk.push(b'\n');
        if let Err(e) =
          store.append_output(job_id, stream, &chunk).await
        {
          tracing::warn!(error = %e, %job_id, "failed to append job output");
          break;
        }
        if let Err(e) =
          store.enforce_log_limit(job_id, logs_max_bytes).await
        {
          tracing::warn!(error = %e, %job_id, "failed to enforce log limit");
        }
      }
      Ok(None) => break,
      Err(e) => {
        tracing::warn!(error = %e, %job_id, "job output stream read error");
        break;
      }
    }
  }
}
