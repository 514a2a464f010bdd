use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{JobId, ProjectId};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Queued,
  Starting,
  Running,
  Completed,
  Failed,
  Cancelled,
  /// Reserved for future runners; no runner currently emits it. Kept as
  /// an inert, round-trippable variant per the spec's open question.
  AwaitingInput,
}

impl JobStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
    )
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMeta {
  pub job_id: JobId,
  pub status: JobStatus,
  /// Identifies the runner implementation; currently always `"process"`.
  pub runner: String,
  pub command: Vec<String>,
  pub project_id: Option<ProjectId>,
  pub project_name: Option<String>,
  pub created_at: i64,
  pub updated_at: i64,
  pub last_event_seq: u64,
  pub pid: Option<u32>,
  pub exit_code: Option<i32>,
}

impl JobMeta {
  pub fn new(
    job_id: JobId,
    command: Vec<String>,
    project_id: Option<ProjectId>,
    project_name: Option<String>,
  ) -> Self {
    let now = crate::time::now_ms();
    Self {
      job_id,
      status: JobStatus::Queued,
      runner: "process".to_string(),
      command,
      project_id,
      project_name,
      created_at: now,
      updated_at: now,
      last_event_seq: 0,
      pid: None,
      exit_code: None,
    }
  }
}

/// One line of `events.jsonl`. `seq` is monotonic starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
  pub seq: u64,
  pub ts: i64,
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payload: Option<serde_json::Value>,
}

/// Request body for `POST .../jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
  pub command: Vec<String>,
  #[serde(default)]
  pub env: HashMap<String, String>,
  pub cwd: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsListResponse {
  pub jobs: Vec<JobMeta>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn awaiting_input_round_trips() {
    let json = serde_json::to_string(&JobStatus::AwaitingInput).unwrap();
    assert_eq!(json, "\"awaiting_input\"");
    let back: JobStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(back, JobStatus::AwaitingInput);
  }

  #[test]
  fn terminal_statuses() {
    assert!(JobStatus::Completed.is_terminal());
    assert!(JobStatus::Failed.is_terminal());
    assert!(JobStatus::Cancelled.is_terminal());
    assert!(!JobStatus::Queued.is_terminal());
    assert!(!JobStatus::Running.is_terminal());
    assert!(!JobStatus::AwaitingInput.is_terminal());
  }

  #[test]
  fn new_job_starts_queued_with_zero_seq() {
    let meta = JobMeta::new(
      JobId::new(),
      vec!["echo".into(), "hi".into()],
      None,
      None,
    );
    assert_eq!(meta.status, JobStatus::Queued);
    assert_eq!(meta.last_event_seq, 0);
    assert_eq!(meta.created_at, meta.updated_at);
  }
}
