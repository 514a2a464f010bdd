//! `GET .../shells/<shellId>/stream` (`SPEC_FULL.md` §4.12). Bridges one
//! WebSocket connection onto a [`hack_shell::ShellAttachment`]: PTY
//! bytes out as `output`, client frames in as `input`/`resize`/`signal`.
//! Grounded on `bin/periphery/src/terminal.rs`'s bidirectional bridge,
//! retargeted from a raw byte tunnel onto the spec's typed envelope.

use std::sync::Arc;

use axum::{
  extract::{Path, State, WebSocketUpgrade},
  extract::ws::{Message, WebSocket},
  http::HeaderMap,
  response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use hack_core::{
  ids::{ProjectId, ShellId},
  shell::{ShellMeta, ShellSignal},
};
use hack_shell::{ShellAttachment, ShellEvent};
use serde::{Deserialize, Serialize};

use crate::{error::ApiResult, state::AppState};

pub async fn upgrade(
  State(state): State<Arc<AppState>>,
  Path((project_id, shell_id)): Path<(ProjectId, ShellId)>,
  headers: HeaderMap,
  ws: WebSocketUpgrade,
) -> ApiResult<Response> {
  if !super::is_websocket_upgrade(&headers) {
    return Err(hack_core::Error::UpgradeRequired.into());
  }
  state.resolve_project(project_id).await?;
  let meta = state
    .shells
    .meta(shell_id)
    .await
    .ok_or(hack_core::Error::NotFound)?;
  if meta.project_id != Some(project_id) {
    return Err(hack_core::Error::NotFound.into());
  }
  let attachment = state
    .shells
    .attach(shell_id)
    .await
    .ok_or(hack_core::Error::NotFound)?;

  let metrics = state.metrics.clone();
  metrics.stream_opened();
  Ok(
    ws.on_upgrade(move |socket| async move {
      run(socket, attachment, meta).await;
      metrics.stream_closed();
    })
    .into_response(),
  )
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
  Hello {
    cols: Option<u16>,
    rows: Option<u16>,
  },
  Resize {
    cols: u16,
    rows: u16,
  },
  Input {
    data: String,
  },
  Signal {
    signal: String,
  },
  Close,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ServerMessage {
  Ready {
    shell_id: ShellId,
    cols: u16,
    rows: u16,
    cwd: String,
    shell: String,
    status: hack_core::shell::ShellStatus,
  },
  Output {
    data: String,
  },
  Exit {
    exit_code: i32,
    signal: Option<String>,
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

async fn run(socket: WebSocket, mut attachment: ShellAttachment, meta: ShellMeta) {
  let (mut sink, mut stream) = socket.split();

  let ready = ServerMessage::Ready {
    shell_id: meta.shell_id,
    cols: meta.cols,
    rows: meta.rows,
    cwd: meta.cwd,
    shell: meta.shell,
    status: meta.status,
  };
  if !send(&mut sink, &ready).await {
    return;
  }

  loop {
    tokio::select! {
      biased;
      incoming = stream.next() => {
        match incoming {
          Some(Ok(Message::Text(text))) => {
            if !handle_client_message(text.as_str(), &attachment) {
              break;
            }
          }
          Some(Ok(Message::Binary(bytes))) => {
            let _ = attachment.write(bytes.to_vec());
          }
          Some(Ok(Message::Close(_))) | None => break,
          Some(Err(_)) => break,
          _ => {}
        }
      }
      event = attachment.recv_event() => {
        match event {
          ShellEvent::Data(bytes) => {
            let data = String::from_utf8_lossy(&bytes).into_owned();
            if !send(&mut sink, &ServerMessage::Output { data }).await {
              break;
            }
          }
          ShellEvent::Exit(info) => {
            let _ = send(&mut sink, &ServerMessage::Exit {
              exit_code: info.exit_code,
              signal: info.signal,
            }).await;
            break;
          }
          ShellEvent::Closed => break,
        }
      }
    }
  }

  attachment.detach();
}

/// Applies one client-to-server control frame. Returns `false` when the
/// connection should close (an explicit `close`, or any frame that
/// isn't valid JSON gets treated as raw keystrokes instead of an error —
/// matching the protocol's "raw frames" allowance).
fn handle_client_message(text: &str, attachment: &ShellAttachment) -> bool {
  match serde_json::from_str::<ClientMessage>(text) {
    Ok(ClientMessage::Hello { cols: Some(cols), rows: Some(rows) })
    | Ok(ClientMessage::Resize { cols, rows }) => {
      let _ = attachment.resize(cols, rows);
      true
    }
    Ok(ClientMessage::Hello { .. }) => true,
    Ok(ClientMessage::Input { data }) => {
      let _ = attachment.write(data.into_bytes());
      true
    }
    Ok(ClientMessage::Signal { signal }) => {
      if let Some(sig) = ShellSignal::parse(&signal) {
        attachment.signal(sig);
      }
      true
    }
    Ok(ClientMessage::Close) => {
      attachment.close();
      false
    }
    Err(_) => {
      let _ = attachment.write(text.as_bytes().to_vec());
      true
    }
  }
}

#[cfg(test)]
mod tests {
  use hack_shell::{CreateShellParams, ShellEvent, ShellService};

  use super::*;

  async fn spawn_sh_attachment(
    dir: &std::path::Path,
  ) -> (std::sync::Arc<hack_shell::ShellSession>, ShellAttachment) {
    let service = ShellService::new();
    let session = service
      .create_shell(CreateShellParams {
        project_root: dir.to_path_buf(),
        shell: Some("/bin/sh".to_string()),
        ..Default::default()
      })
      .await
      .unwrap();
    let attachment = session.attach();
    (session, attachment)
  }

  #[tokio::test]
  async fn hello_with_size_applies_a_resize() {
    let dir = tempfile::tempdir().unwrap();
    let (_session, attachment) = spawn_sh_attachment(dir.path()).await;

    assert!(handle_client_message(
      r#"{"type":"hello","cols":100,"rows":40}"#,
      &attachment
    ));
    assert_eq!(attachment.meta().cols, 100);
    assert_eq!(attachment.meta().rows, 40);
  }

  #[tokio::test]
  async fn resize_message_updates_session_size() {
    let dir = tempfile::tempdir().unwrap();
    let (_session, attachment) = spawn_sh_attachment(dir.path()).await;

    assert!(handle_client_message(
      r#"{"type":"resize","cols":120,"rows":50}"#,
      &attachment
    ));
    assert_eq!(attachment.meta().cols, 120);
    assert_eq!(attachment.meta().rows, 50);
  }

  #[tokio::test]
  async fn input_and_raw_frames_both_reach_the_pty() {
    let dir = tempfile::tempdir().unwrap();
    let (_session, mut attachment) = spawn_sh_attachment(dir.path()).await;

    assert!(handle_client_message(
      r#"{"type":"input","data":"echo hi; exit\n"}"#,
      &attachment
    ));

    let mut saw_output = false;
    loop {
      match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        attachment.recv_event(),
      )
      .await
      .expect("shell did not respond in time")
      {
        ShellEvent::Data(bytes) => {
          if bytes.windows(2).any(|w| w == b"hi") {
            saw_output = true;
          }
        }
        ShellEvent::Exit(_) | ShellEvent::Closed => break,
      }
    }
    assert!(saw_output, "expected the echoed text on the pty");
  }

  #[tokio::test]
  async fn close_message_requests_shutdown_and_returns_false() {
    let dir = tempfile::tempdir().unwrap();
    let (_session, mut attachment) = spawn_sh_attachment(dir.path()).await;

    assert!(!handle_client_message(r#"{"type":"close"}"#, &attachment));

    let event = tokio::time::timeout(
      std::time::Duration::from_secs(5),
      attachment.recv_event(),
    )
    .await
    .expect("expected the shell to exit after close");
    assert!(matches!(event, ShellEvent::Exit(_)));
  }
}
