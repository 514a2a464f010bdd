//! `GET .../jobs/<jobId>/stream` (`SPEC_FULL.md` §4.12). A resumable
//! poll loop over `JobStore`'s `combined.log` and `events.jsonl` — the
//! supervisor's runner is the only writer, this connection only reads.

use std::{path::Path, sync::Arc, time::Duration};

use axum::{
  extract::{Path as AxumPath, State, WebSocketUpgrade},
  extract::ws::{Message, WebSocket},
  http::HeaderMap,
  response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use hack_core::{
  ids::{JobId, ProjectId},
  job::JobEvent,
  time::now_ms,
};
use hack_storage::JobStore;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::{error::ApiResult, state::AppState};

/// Both the log tail and the event re-read happen on this cadence; the
/// heartbeat fires every tenth tick (5s).
const TICK: Duration = Duration::from_millis(500);
const HEARTBEAT_EVERY_N_TICKS: u32 = 10;

pub async fn upgrade(
  State(state): State<Arc<AppState>>,
  AxumPath((project_id, job_id)): AxumPath<(ProjectId, JobId)>,
  headers: HeaderMap,
  ws: WebSocketUpgrade,
) -> ApiResult<Response> {
  if !super::is_websocket_upgrade(&headers) {
    return Err(hack_core::Error::UpgradeRequired.into());
  }
  let project = state.resolve_project(project_id).await?;
  let store = JobStore::new(project.project_dir.clone());
  store
    .read_job_meta(job_id)
    .await?
    .ok_or(hack_core::Error::NotFound)?;

  let metrics = state.metrics.clone();
  metrics.stream_opened();
  Ok(
    ws.on_upgrade(move |socket| async move {
      run(socket, store, job_id).await;
      metrics.stream_closed();
    })
    .into_response(),
  )
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
  Hello {
    #[serde(default)]
    logs_from: Option<u64>,
    #[serde(default)]
    events_from: Option<u64>,
  },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ServerMessage {
  Ready {
    logs_offset: u64,
    events_seq: u64,
  },
  Log {
    stream: &'static str,
    offset: u64,
    data: String,
  },
  Event {
    seq: u64,
    event: JobEvent,
  },
  Heartbeat {
    ts: i64,
    logs_offset: u64,
    events_seq: u64,
  },
  Error {
    message: &'static str,
  },
}

async fn send(
  sink: &mut (impl futures_util::Sink<Message, Error = axum::Error> + Unpin),
  msg: &ServerMessage,
) -> bool {
  let Ok(text) = serde_json::to_string(msg) else {
    return false;
  };
  sink.send(Message::Text(text.into())).await.is_ok()
}

async fn run(socket: WebSocket, store: JobStore, job_id: JobId) {
  let (mut sink, mut stream) = socket.split();

  let first = match stream.next().await {
    Some(Ok(Message::Text(text))) => text.to_string(),
    Some(Ok(Message::Close(_))) | None => return,
    Some(Ok(_)) => {
      send(&mut sink, &ServerMessage::Error { message: "expected_hello" }).await;
      return;
    }
    Some(Err(_)) => return,
  };

  let (mut logs_offset, mut events_seq) =
    match serde_json::from_str::<ClientMessage>(&first) {
      Ok(ClientMessage::Hello { logs_from, events_from }) => {
        (logs_from.unwrap_or(0), events_from.unwrap_or(0))
      }
      Err(_) => {
        send(&mut sink, &ServerMessage::Error { message: "invalid_message" }).await;
        return;
      }
    };

  if !send(
    &mut sink,
    &ServerMessage::Ready { logs_offset, events_seq },
  )
  .await
  {
    return;
  }

  let paths = store.paths(job_id);
  let mut ticker = tokio::time::interval(TICK);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
  let mut ticks: u32 = 0;

  loop {
    tokio::select! {
      biased;
      incoming = stream.next() => {
        match incoming {
          Some(Ok(Message::Close(_))) | None => break,
          Some(Err(_)) => break,
          // This stream is read-only from the client's side; stray
          // frames (pings aside, which axum answers automatically) are
          // simply ignored.
          _ => {}
        }
      }
      _ = ticker.tick() => {
        ticks += 1;

        match read_log_delta(&paths.combined, logs_offset).await {
          Ok(Some((new_offset, data))) => {
            logs_offset = new_offset;
            let msg = ServerMessage::Log { stream: "combined", offset: logs_offset, data };
            if !send(&mut sink, &msg).await {
              break;
            }
          }
          Ok(None) => {}
          Err(e) => tracing::warn!(error = %e, %job_id, "failed to read job log delta"),
        }

        match store.read_events(job_id).await {
          Ok(events) => {
            let mut disconnected = false;
            for event in events.into_iter().filter(|e| e.seq > events_seq) {
              events_seq = event.seq;
              if !send(&mut sink, &ServerMessage::Event { seq: event.seq, event }).await {
                disconnected = true;
                break;
              }
            }
            if disconnected {
              break;
            }
          }
          Err(e) => tracing::warn!(error = %e, %job_id, "failed to re-read job events"),
        }

        if ticks % HEARTBEAT_EVERY_N_TICKS == 0 {
          let msg = ServerMessage::Heartbeat { ts: now_ms(), logs_offset, events_seq };
          if !send(&mut sink, &msg).await {
            break;
          }
        }
      }
    }
  }
}

/// Reads whatever bytes were appended to `path` since `offset`. Returns
/// `None` if the file hasn't grown (or doesn't exist yet — the
/// supervisor creates it lazily on first output).
async fn read_log_delta(
  path: &Path,
  offset: u64,
) -> anyhow::Result<Option<(u64, String)>> {
  let mut file = match tokio::fs::File::open(path).await {
    Ok(f) => f,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e.into()),
  };
  let len = file.metadata().await?.len();
  if len <= offset {
    return Ok(None);
  }
  file.seek(std::io::SeekFrom::Start(offset)).await?;
  let mut buf = Vec::with_capacity((len - offset) as usize);
  file.read_to_end(&mut buf).await?;
  Ok(Some((len, String::from_utf8_lossy(&buf).into_owned())))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn missing_file_yields_no_delta() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("combined.log");
    assert!(read_log_delta(&path, 0).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn reads_only_bytes_appended_since_offset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("combined.log");
    tokio::fs::write(&path, b"hello world").await.unwrap();

    let (offset, data) = read_log_delta(&path, 0).await.unwrap().unwrap();
    assert_eq!(offset, 11);
    assert_eq!(data, "hello world");

    tokio::fs::write(&path, b"hello world, more").await.unwrap();
    let (offset, data) = read_log_delta(&path, offset).await.unwrap().unwrap();
    assert_eq!(offset, 17);
    assert_eq!(data, ", more");
  }

  #[tokio::test]
  async fn unchanged_file_yields_no_delta() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("combined.log");
    tokio::fs::write(&path, b"hi").await.unwrap();
    assert!(read_log_delta(&path, 2).await.unwrap().is_none());
  }
}
