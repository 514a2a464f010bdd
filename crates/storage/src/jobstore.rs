use std::path::{Path, PathBuf};

use hack_core::{
  ids::{JobId, ProjectId},
  job::{JobEvent, JobMeta, JobStatus},
  time::now_ms,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::atomic::{write_atomic, write_json_atomic};

/// The four deterministic paths owned by one job's directory.
pub struct JobPaths {
  pub dir: PathBuf,
  pub meta: PathBuf,
  pub events: PathBuf,
  pub stdout: PathBuf,
  pub stderr: PathBuf,
  pub combined: PathBuf,
}

/// `<projectDir>/supervisor/jobs/<jobId>/` — one store per project,
/// shared by the supervisor's runner and the daemon's job/stream
/// handlers. `seq` starts at 1 and is bumped under the store's own
/// mutual exclusion (callers serialize appends per job; see
/// `hack-supervisor`).
#[derive(Clone)]
pub struct JobStore {
  project_dir: PathBuf,
}

impl JobStore {
  pub fn new(project_dir: PathBuf) -> Self {
    Self { project_dir }
  }

  pub fn project_dir(&self) -> &Path {
    &self.project_dir
  }

  pub fn paths(&self, job_id: JobId) -> JobPaths {
    let dir = self
      .project_dir
      .join("supervisor")
      .join("jobs")
      .join(job_id.to_string());
    JobPaths {
      meta: dir.join("meta.json"),
      events: dir.join("events.jsonl"),
      stdout: dir.join("stdout.log"),
      stderr: dir.join("stderr.log"),
      combined: dir.join("combined.log"),
      dir,
    }
  }

  /// Writes `queued` meta and appends the `job.created` event at seq 1.
  pub async fn create_job(
    &self,
    command: Vec<String>,
    project_id: Option<ProjectId>,
    project_name: Option<String>,
  ) -> anyhow::Result<JobMeta> {
    let job_id = JobId::new();
    let paths = self.paths(job_id);
    tokio::fs::create_dir_all(&paths.dir).await?;

    let mut meta =
      JobMeta::new(job_id, command, project_id, project_name);
    write_json_atomic(&paths.meta, &meta).await?;

    let event = self.append_event_at(&paths, &mut meta, "job.created", None).await?;
    debug_assert_eq!(event.seq, 1);
    Ok(meta)
  }

  pub async fn read_job_meta(
    &self,
    job_id: JobId,
  ) -> anyhow::Result<Option<JobMeta>> {
    let paths = self.paths(job_id);
    match tokio::fs::read(&paths.meta).await {
      Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  pub async fn update_job_status(
    &self,
    job_id: JobId,
    status: JobStatus,
    pid: Option<u32>,
    exit_code: Option<i32>,
  ) -> anyhow::Result<JobMeta> {
    let paths = self.paths(job_id);
    let mut meta = self
      .read_job_meta(job_id)
      .await?
      .ok_or_else(|| anyhow::anyhow!("job {job_id} not found"))?;
    meta.status = status;
    meta.updated_at = now_ms();
    if pid.is_some() {
      meta.pid = pid;
    }
    if exit_code.is_some() {
      meta.exit_code = exit_code;
    }
    write_json_atomic(&paths.meta, &meta).await?;
    Ok(meta)
  }

  /// Appends an event for an existing job, reading and rewriting meta
  /// to bump `lastEventSeq` in the same pass.
  pub async fn append_event(
    &self,
    job_id: JobId,
    kind: &str,
    payload: Option<serde_json::Value>,
  ) -> anyhow::Result<JobEvent> {
    let paths = self.paths(job_id);
    let mut meta = self
      .read_job_meta(job_id)
      .await?
      .ok_or_else(|| anyhow::anyhow!("job {job_id} not found"))?;
    self.append_event_at(&paths, &mut meta, kind, payload).await
  }

  async fn append_event_at(
    &self,
    paths: &JobPaths,
    meta: &mut JobMeta,
    kind: &str,
    payload: Option<serde_json::Value>,
  ) -> anyhow::Result<JobEvent> {
    let event = JobEvent {
      seq: meta.last_event_seq + 1,
      ts: now_ms(),
      kind: kind.to_string(),
      payload,
    };

    let mut line = serde_json::to_vec(&event)?;
    line.push(b'\n');
    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&paths.events)
      .await?;
    file.write_all(&line).await?;

    meta.last_event_seq = event.seq;
    meta.updated_at = event.ts;
    write_json_atomic(&paths.meta, meta).await?;

    Ok(event)
  }

  /// Parses `events.jsonl` in order; lines that fail to parse are
  /// dropped silently.
  pub async fn read_events(
    &self,
    job_id: JobId,
  ) -> anyhow::Result<Vec<JobEvent>> {
    let paths = self.paths(job_id);
    read_events_from(&paths.events).await
  }

  /// Appends a chunk to both a per-stream log and `combined.log`. Each
  /// append is a single write syscall, so interleaved stdout/stderr
  /// chunks never tear within themselves.
  pub async fn append_output(
    &self,
    job_id: JobId,
    stream: OutputStream,
    chunk: &[u8],
  ) -> anyhow::Result<()> {
    let paths = self.paths(job_id);
    let stream_path = match stream {
      OutputStream::Stdout => &paths.stdout,
      OutputStream::Stderr => &paths.stderr,
    };
    append_chunk(stream_path, chunk).await?;
    append_chunk(&paths.combined, chunk).await?;
    Ok(())
  }

  /// Lists every job under this project, most recently created first.
  /// Directories that fail to parse (missing or corrupt `meta.json`)
  /// are skipped.
  pub async fn list_jobs(&self) -> anyhow::Result<Vec<JobMeta>> {
    let jobs_dir = self.project_dir.join("supervisor").join("jobs");
    let mut entries = match tokio::fs::read_dir(&jobs_dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Ok(Vec::new());
      }
      Err(e) => return Err(e.into()),
    };

    let mut metas = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
      let meta_path = entry.path().join("meta.json");
      let Ok(bytes) = tokio::fs::read(&meta_path).await else {
        continue;
      };
      if let Ok(meta) = serde_json::from_slice::<JobMeta>(&bytes) {
        metas.push(meta);
      }
    }
    metas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(metas)
  }

  /// Projects, per `SPEC_FULL.md` §4.1's `supervisor.logsMaxBytes`,
  /// whether a job's logs should be truncated. The supervisor runner
  /// checks this after each flush and drops the oldest bytes of
  /// `combined.log` (and the matching per-stream logs) once exceeded.
  pub async fn combined_log_len(
    &self,
    job_id: JobId,
  ) -> anyhow::Result<u64> {
    let paths = self.paths(job_id);
    match tokio::fs::metadata(&paths.combined).await {
      Ok(meta) => Ok(meta.len()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
      Err(e) => Err(e.into()),
    }
  }

  /// Drops the oldest bytes of `combined.log`, `stdout.log`, and
  /// `stderr.log` once any of them exceeds `max_bytes`, snapping to the
  /// next line boundary so a reader never sees a torn first line.
  /// `max_bytes = 0` disables the limit.
  pub async fn enforce_log_limit(
    &self,
    job_id: JobId,
    max_bytes: u64,
  ) -> anyhow::Result<()> {
    if max_bytes == 0 {
      return Ok(());
    }
    let paths = self.paths(job_id);
    for path in [&paths.combined, &paths.stdout, &paths.stderr] {
      truncate_head(path, max_bytes).await?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
  Stdout,
  Stderr,
}

async fn append_chunk(path: &Path, chunk: &[u8]) -> anyhow::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  let mut file = tokio::fs::OpenOptions::new()
    .create(true)
    .append(true)
    .open(path)
    .await?;
  file.write_all(chunk).await?;
  Ok(())
}

async fn truncate_head(path: &Path, max_bytes: u64) -> anyhow::Result<()> {
  let len = match tokio::fs::metadata(path).await {
    Ok(meta) => meta.len(),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e.into()),
  };
  if len <= max_bytes {
    return Ok(());
  }
  let data = tokio::fs::read(path).await?;
  let cut = data.len() - max_bytes as usize;
  let cut = data[cut..]
    .iter()
    .position(|&b| b == b'\n')
    .map(|i| cut + i + 1)
    .unwrap_or(cut);
  write_atomic(path, &data[cut..]).await?;
  Ok(())
}

async fn read_events_from(path: &Path) -> anyhow::Result<Vec<JobEvent>> {
  let file = match tokio::fs::File::open(path).await {
    Ok(f) => f,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      return Ok(Vec::new());
    }
    Err(e) => return Err(e.into()),
  };
  let mut lines = BufReader::new(file).lines();
  let mut events = Vec::new();
  while let Some(line) = lines.next_line().await? {
    if let Ok(event) = serde_json::from_str(&line) {
      events.push(event);
    }
  }
  Ok(events)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn create_job_writes_meta_and_created_event() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().to_path_buf());
    let meta = store
      .create_job(vec!["echo".into(), "hi".into()], None, None)
      .await
      .unwrap();
    assert_eq!(meta.status, JobStatus::Queued);
    assert_eq!(meta.last_event_seq, 1);

    let events = store.read_events(meta.job_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "job.created");
    assert_eq!(events[0].seq, 1);

    let reloaded = store.read_job_meta(meta.job_id).await.unwrap().unwrap();
    assert_eq!(reloaded.last_event_seq, 1);
  }

  #[tokio::test]
  async fn event_sequence_is_monotonic_and_matches_meta() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().to_path_buf());
    let meta = store
      .create_job(vec!["echo".into()], None, None)
      .await
      .unwrap();

    store
      .append_event(meta.job_id, "job.starting", None)
      .await
      .unwrap();
    store
      .append_event(
        meta.job_id,
        "job.started",
        Some(serde_json::json!({"pid": 123})),
      )
      .await
      .unwrap();
    let last = store
      .append_event(meta.job_id, "job.completed", None)
      .await
      .unwrap();
    assert_eq!(last.seq, 4);

    let events = store.read_events(meta.job_id).await.unwrap();
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);

    let reloaded = store.read_job_meta(meta.job_id).await.unwrap().unwrap();
    assert_eq!(reloaded.last_event_seq, 4);
  }

  #[tokio::test]
  async fn corrupt_event_lines_are_dropped_silently() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().to_path_buf());
    let meta = store
      .create_job(vec!["echo".into()], None, None)
      .await
      .unwrap();
    let paths = store.paths(meta.job_id);
    let mut file = tokio::fs::OpenOptions::new()
      .append(true)
      .open(&paths.events)
      .await
      .unwrap();
    file.write_all(b"not json at all\n").await.unwrap();

    let events = store.read_events(meta.job_id).await.unwrap();
    assert_eq!(events.len(), 1);
  }

  #[tokio::test]
  async fn append_output_writes_both_stream_and_combined_log() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().to_path_buf());
    let meta = store
      .create_job(vec!["echo".into()], None, None)
      .await
      .unwrap();
    store
      .append_output(meta.job_id, OutputStream::Stdout, b"hello\n")
      .await
      .unwrap();
    store
      .append_output(meta.job_id, OutputStream::Stderr, b"oops\n")
      .await
      .unwrap();

    let paths = store.paths(meta.job_id);
    let stdout = tokio::fs::read_to_string(&paths.stdout).await.unwrap();
    let combined =
      tokio::fs::read_to_string(&paths.combined).await.unwrap();
    assert_eq!(stdout, "hello\n");
    assert_eq!(combined, "hello\noops\n");
  }

  #[tokio::test]
  async fn list_jobs_returns_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().to_path_buf());
    let first = store
      .create_job(vec!["a".into()], None, None)
      .await
      .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let second = store
      .create_job(vec!["b".into()], None, None)
      .await
      .unwrap();

    let jobs = store.list_jobs().await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].job_id, second.job_id);
    assert_eq!(jobs[1].job_id, first.job_id);
  }

  #[tokio::test]
  async fn enforce_log_limit_drops_oldest_lines() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().to_path_buf());
    let meta = store
      .create_job(vec!["a".into()], None, None)
      .await
      .unwrap();
    for i in 0..10 {
      store
        .append_output(
          meta.job_id,
          OutputStream::Stdout,
          format!("line{i}\n").as_bytes(),
        )
        .await
        .unwrap();
    }
    store.enforce_log_limit(meta.job_id, 20).await.unwrap();

    let paths = store.paths(meta.job_id);
    let stdout = tokio::fs::read_to_string(&paths.stdout).await.unwrap();
    assert!(stdout.len() <= 20 + "line9\n".len());
    assert!(stdout.ends_with("line9\n"));
    assert!(!stdout.contains("line0\n"));
  }

  #[tokio::test]
  async fn enforce_log_limit_zero_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().to_path_buf());
    let meta = store
      .create_job(vec!["a".into()], None, None)
      .await
      .unwrap();
    store
      .append_output(meta.job_id, OutputStream::Stdout, b"hello\n")
      .await
      .unwrap();
    store.enforce_log_limit(meta.job_id, 0).await.unwrap();
    let paths = store.paths(meta.job_id);
    let stdout = tokio::fs::read_to_string(&paths.stdout).await.unwrap();
    assert_eq!(stdout, "hello\n");
  }

  #[tokio::test]
  async fn list_jobs_on_missing_dir_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().to_path_buf());
    assert!(store.list_jobs().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn update_job_status_bumps_updated_at_and_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().to_path_buf());
    let meta = store
      .create_job(vec!["echo".into()], None, None)
      .await
      .unwrap();
    let updated = store
      .update_job_status(
        meta.job_id,
        JobStatus::Running,
        Some(4242),
        None,
      )
      .await
      .unwrap();
    assert_eq!(updated.status, JobStatus::Running);
    assert_eq!(updated.pid, Some(4242));
  }
}
