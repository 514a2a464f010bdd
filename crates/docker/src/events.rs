use std::{process::Stdio, sync::Arc};

use tokio::{
  io::{AsyncBufReadExt, BufReader},
  process::Command,
  sync::Notify,
};
use tokio_util::sync::CancellationToken;

/// Tails `docker events --filter type=container --format {{json .}}` and
/// invokes `on_event` once per line. Reconnects with
/// `min(2000, 200 * 2^attempt)` ms backoff on exit or error.
pub struct EventWatcher {
  cancel: CancellationToken,
  stopped: Arc<Notify>,
}

impl EventWatcher {
  pub fn spawn(
    on_event: impl Fn(String) + Send + Sync + 'static,
  ) -> Self {
    let cancel = CancellationToken::new();
    let stopped = Arc::new(Notify::new());

    let task_cancel = cancel.clone();
    let task_stopped = stopped.clone();
    tokio::spawn(async move {
      run_loop(task_cancel, on_event).await;
      task_stopped.notify_waiters();
    });

    Self { cancel, stopped }
  }

  /// Cancels the watcher and waits for its task to finish.
  pub async fn stop(&self) {
    self.cancel.cancel();
    self.stopped.notified().await;
  }
}

async fn run_loop(
  cancel: CancellationToken,
  on_event: impl Fn(String),
) {
  let mut attempt: u32 = 0;

  loop {
    if cancel.is_cancelled() {
      return;
    }

    let mut child = match Command::new("docker")
      .args([
        "events",
        "--filter",
        "type=container",
        "--format",
        "{{json .}}",
      ])
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .kill_on_drop(true)
      .spawn()
    {
      Ok(child) => child,
      Err(e) => {
        tracing::warn!(error = %e, "failed to spawn docker events");
        if backoff(&cancel, attempt).await {
          return;
        }
        attempt += 1;
        continue;
      }
    };

    let Some(stdout) = child.stdout.take() else {
      if backoff(&cancel, attempt).await {
        return;
      }
      attempt += 1;
      continue;
    };

    let mut lines = BufReader::new(stdout).lines();
    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          let _ = child.start_kill();
          return;
        }
        line = lines.next_line() => {
          match line {
            Ok(Some(line)) => {
              attempt = 0;
              on_event(line);
            }
            Ok(None) => break,
            Err(e) => {
              tracing::warn!(error = %e, "docker events read error");
              break;
            }
          }
        }
      }
    }

    let _ = child.start_kill();
    let _ = child.wait().await;

    if backoff(&cancel, attempt).await {
      return;
    }
    attempt += 1;
  }
}

/// Waits out the reconnect delay, or returns `true` immediately if
/// cancelled mid-wait.
async fn backoff(cancel: &CancellationToken, attempt: u32) -> bool {
  let delay_ms = 200u64.saturating_mul(1u64 << attempt.min(16)).min(2000);
  tokio::select! {
    _ = cancel.cancelled() => true,
    _ = tokio::time::sleep(std::time::Duration::from_millis(delay_ms)) => false,
  }
}
