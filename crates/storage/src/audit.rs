use std::path::PathBuf;

use hack_core::audit::AuditEntry;
use tokio::{
  fs::OpenOptions,
  io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};

/// Appends to `gateway/audit.jsonl`, one JSON object per gateway (TCP)
/// request. Local Unix-socket traffic is never audited.
pub struct AuditLog {
  path: PathBuf,
}

impl AuditLog {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  /// Appends an entry. Failures are logged and swallowed — an audit
  /// write can never fail a request.
  pub async fn append(&self, entry: &AuditEntry) {
    if let Err(e) = self.try_append(entry).await {
      tracing::warn!(error = %e, "failed to append audit log entry");
    }
  }

  async fn try_append(&self, entry: &AuditEntry) -> anyhow::Result<()> {
    if let Some(parent) = self.path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .await?;
    file.write_all(&line).await?;
    Ok(())
  }

  /// Reads all entries back, in file order, for tests and diagnostics.
  /// Lines that fail to parse are skipped.
  pub async fn read_all(&self) -> anyhow::Result<Vec<AuditEntry>> {
    let file = match tokio::fs::File::open(&self.path).await {
      Ok(f) => f,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Ok(Vec::new());
      }
      Err(e) => return Err(e.into()),
    };
    let mut lines = BufReader::new(file).lines();
    let mut entries = Vec::new();
    while let Some(line) = lines.next_line().await? {
      if let Ok(entry) = serde_json::from_str(&line) {
        entries.push(entry);
      }
    }
    Ok(entries)
  }
}

/// Strips `token`/`access_token` query parameters from a request path
/// before it is written to the audit log or any log line.
pub fn sanitize_path(path: &str) -> String {
  let Some((base, query)) = path.split_once('?') else {
    return path.to_string();
  };
  let kept: Vec<String> = query
    .split('&')
    .filter(|pair| {
      let key = pair.split('=').next().unwrap_or("");
      key != "token" && key != "access_token"
    })
    .map(str::to_string)
    .collect();
  if kept.is_empty() {
    base.to_string()
  } else {
    format!("{base}?{}", kept.join("&"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sanitize_strips_token_params() {
    assert_eq!(
      sanitize_path("/v1/jobs?token=secret&foo=bar"),
      "/v1/jobs?foo=bar"
    );
    assert_eq!(
      sanitize_path("/v1/jobs?access_token=secret"),
      "/v1/jobs"
    );
    assert_eq!(sanitize_path("/v1/jobs"), "/v1/jobs");
    assert_eq!(sanitize_path("/v1/jobs?foo=bar"), "/v1/jobs?foo=bar");
  }

  #[tokio::test]
  async fn append_then_read_all_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let log = AuditLog::new(dir.path().join("gateway").join("audit.jsonl"));
    log
      .append(&AuditEntry {
        ts: 1,
        method: "GET".into(),
        path: "/v1/projects".into(),
        status: 200,
        token_id: None,
        remote_address: Some("127.0.0.1:9".into()),
        user_agent: None,
      })
      .await;
    log
      .append(&AuditEntry {
        ts: 2,
        method: "POST".into(),
        path: "/v1/jobs".into(),
        status: 201,
        token_id: None,
        remote_address: None,
        user_agent: None,
      })
      .await;
    let entries = log.read_all().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, 200);
    assert_eq!(entries[1].method, "POST");
  }

  #[tokio::test]
  async fn missing_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let log = AuditLog::new(dir.path().join("audit.jsonl"));
    assert!(log.read_all().await.unwrap().is_empty());
  }
}
