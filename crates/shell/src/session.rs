use std::{
  collections::HashMap,
  io::Write as _,
  path::PathBuf,
  sync::{Arc, RwLock},
};

use bytes::Bytes;
use hack_core::{
  ids::{ProjectId, ShellId},
  shell::{ShellMeta, ShellSignal, ShellStatus},
  time::now_ms,
};
use portable_pty::{CommandBuilder, PtySize, native_pty_system};
use tokio::sync::{broadcast, mpsc, watch};

use crate::ShellError;

#[derive(Debug, Clone)]
pub struct ExitInfo {
  pub exit_code: i32,
  pub signal: Option<String>,
}

pub enum ShellEvent {
  Data(Bytes),
  Exit(ExitInfo),
  /// The broadcast side closed without ever observing an exit — should
  /// not happen in practice, but keeps `recv_event` total.
  Closed,
}

enum WriteCmd {
  Data(Vec<u8>),
}

/// One live PTY-backed shell. Spawned by [`crate::ShellService::create_shell`],
/// held behind an `Arc` so every attacher shares the same broadcast/exit
/// channels. Grounded on `bin/periphery/src/terminal.rs`'s three
/// `spawn_blocking` loops (child-wait, stdin-write, pty-read); resize goes
/// directly through `MasterPty::resize` rather than a channel command,
/// since it's a single non-blocking ioctl.
pub struct ShellSession {
  shell_id: ShellId,
  meta: RwLock<ShellMeta>,
  master: Box<dyn portable_pty::MasterPty + Send>,
  pid: i32,
  write_tx: mpsc::Sender<WriteCmd>,
  output_tx: broadcast::Sender<Bytes>,
  exit_tx: watch::Sender<Option<ExitInfo>>,
  exit_rx: watch::Receiver<Option<ExitInfo>>,
}

impl ShellSession {
  #[allow(clippy::too_many_arguments)]
  pub(crate) async fn spawn(
    shell_id: ShellId,
    cwd: PathBuf,
    env: HashMap<String, String>,
    shell: Option<String>,
    cols: u16,
    rows: u16,
    project_id: Option<ProjectId>,
    project_name: Option<String>,
  ) -> Result<Arc<Self>, ShellError> {
    let shell_bin = shell.unwrap_or_else(default_shell);

    let pty = native_pty_system()
      .openpty(PtySize {
        cols,
        rows,
        pixel_width: 0,
        pixel_height: 0,
      })
      .map_err(|e| ShellError::Pty(e.to_string()))?;

    let mut cmd = CommandBuilder::new(&shell_bin);
    cmd.cwd(&cwd);
    for (k, v) in &env {
      cmd.env(k, v);
    }
    if !env.contains_key("TERM") {
      cmd.env("TERM", "xterm-256color");
    }

    let mut child = pty
      .slave
      .spawn_command(cmd)
      .map_err(|e| ShellError::Spawn(e.to_string()))?;
    drop(pty.slave);

    let pid = child.process_id().unwrap_or(0) as i32;

    let writer = pty
      .master
      .take_writer()
      .map_err(|e| ShellError::Pty(e.to_string()))?;
    let reader = pty
      .master
      .try_clone_reader()
      .map_err(|e| ShellError::Pty(e.to_string()))?;

    let meta = ShellMeta {
      shell_id,
      status: ShellStatus::Running,
      project_id,
      cwd: cwd.to_string_lossy().to_string(),
      shell: shell_bin,
      cols,
      rows,
      pid: if pid > 0 { Some(pid as u32) } else { None },
      exit_code: None,
      signal: None,
      created_at: now_ms(),
      updated_at: now_ms(),
    };

    let (output_tx, _) = broadcast::channel(8192);
    let (exit_tx, exit_rx) = watch::channel(None);
    let (write_tx, mut write_rx) = mpsc::channel::<WriteCmd>(1024);

    let session = Arc::new(Self {
      shell_id,
      meta: RwLock::new(meta),
      master: pty.master,
      pid,
      write_tx,
      output_tx: output_tx.clone(),
      exit_tx,
      exit_rx,
    });

    // PTY -> broadcast.
    let read_output_tx = output_tx.clone();
    tokio::task::spawn_blocking(move || {
      let mut reader = reader;
      let mut buf = [0u8; 8192];
      loop {
        match std::io::Read::read(&mut reader, &mut buf) {
          Ok(0) => break,
          Ok(n) => {
            if read_output_tx
              .send(Bytes::copy_from_slice(&buf[..n]))
              .is_err()
            {
              // No subscribers right now; keep draining the PTY so the
              // child never blocks on a full pipe.
              continue;
            }
          }
          Err(e) => {
            tracing::debug!(error = %e, "pty read error");
            break;
          }
        }
      }
    });

    // mpsc writes -> PTY.
    tokio::task::spawn_blocking(move || {
      let mut writer = writer;
      while let Some(cmd) = write_rx.blocking_recv() {
        match cmd {
          WriteCmd::Data(bytes) => {
            if let Err(e) = writer.write_all(&bytes) {
              tracing::debug!(error = %e, "pty write error");
              break;
            }
          }
        }
      }
    });

    // Child wait -> exit_tx.
    let wait_session = session.clone();
    tokio::task::spawn_blocking(move || {
      let status = child.wait();
      let (exit_code, signal) = match status {
        Ok(status) => {
          let code = status.exit_code() as i32;
          let signal = (code >= 128)
            .then(|| signal_name(code - 128))
            .flatten();
          (code, signal)
        }
        Err(_) => (1, None),
      };
      wait_session.mark_exited(exit_code, signal);
    });

    Ok(session)
  }

  pub fn meta(&self) -> ShellMeta {
    self.meta.read().unwrap().clone()
  }

  pub fn attach(self: &Arc<Self>) -> ShellAttachment {
    ShellAttachment {
      session: self.clone(),
      output_rx: self.output_tx.subscribe(),
      exit_rx: self.exit_rx.clone(),
    }
  }

  pub fn write(&self, data: Vec<u8>) -> Result<(), ShellError> {
    if !status_is_running(&self.meta()) {
      return Ok(());
    }
    let _ = self.write_tx.try_send(WriteCmd::Data(data));
    Ok(())
  }

  pub fn resize(&self, cols: u16, rows: u16) -> Result<(), ShellError> {
    if !status_is_running(&self.meta()) {
      return Ok(());
    }
    self
      .master
      .resize(PtySize {
        cols,
        rows,
        pixel_width: 0,
        pixel_height: 0,
      })
      .map_err(|e| ShellError::Pty(e.to_string()))?;
    let mut meta = self.meta.write().unwrap();
    meta.cols = cols;
    meta.rows = rows;
    meta.updated_at = now_ms();
    Ok(())
  }

  pub fn signal(&self, signal: ShellSignal) {
    if self.pid <= 0 {
      return;
    }
    let nix_signal = to_nix_signal(signal);
    if let Err(e) = nix::sys::signal::kill(
      nix::unistd::Pid::from_raw(self.pid),
      nix_signal,
    ) {
      tracing::debug!(error = %e, pid = self.pid, "failed to signal shell");
    }
  }

  pub async fn wait_exited(&self) {
    let mut rx = self.exit_rx.clone();
    if rx.borrow().is_some() {
      return;
    }
    let _ = rx.changed().await;
  }

  fn mark_exited(&self, exit_code: i32, signal: Option<String>) {
    {
      let mut meta = self.meta.write().unwrap();
      meta.status = ShellStatus::Exited;
      meta.exit_code = Some(exit_code);
      meta.signal = signal.clone();
      meta.updated_at = now_ms();
    }
    let _ = self.exit_tx.send(Some(ExitInfo { exit_code, signal }));
  }

  pub fn shell_id(&self) -> ShellId {
    self.shell_id
  }
}

fn status_is_running(meta: &ShellMeta) -> bool {
  meta.status == ShellStatus::Running
}

fn to_nix_signal(signal: ShellSignal) -> nix::sys::signal::Signal {
  use nix::sys::signal::Signal::*;
  match signal {
    ShellSignal::Sigint => SIGINT,
    ShellSignal::Sigterm => SIGTERM,
    ShellSignal::Sigkill => SIGKILL,
    ShellSignal::Sighup => SIGHUP,
    ShellSignal::Sigquit => SIGQUIT,
    ShellSignal::Sigusr1 => SIGUSR1,
    ShellSignal::Sigusr2 => SIGUSR2,
    ShellSignal::Sigtstp => SIGTSTP,
  }
}

fn signal_name(num: i32) -> Option<String> {
  nix::sys::signal::Signal::try_from(num)
    .ok()
    .map(|s| s.as_str().to_string())
}

fn default_shell() -> String {
  std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
}

/// A single attacher's view onto a [`ShellSession`]: an output broadcast
/// receiver plus the exit watch, both independently subscribed so
/// multiple attachments never steal each other's bytes.
pub struct ShellAttachment {
  session: Arc<ShellSession>,
  output_rx: broadcast::Receiver<Bytes>,
  exit_rx: watch::Receiver<Option<ExitInfo>>,
}

impl ShellAttachment {
  pub fn meta(&self) -> ShellMeta {
    self.session.meta()
  }

  pub fn write(&self, data: Vec<u8>) -> Result<(), ShellError> {
    self.session.write(data)
  }

  pub fn resize(&self, cols: u16, rows: u16) -> Result<(), ShellError> {
    self.session.resize(cols, rows)
  }

  pub fn signal(&self, signal: ShellSignal) {
    self.session.signal(signal)
  }

  pub fn close(&self) {
    self.session.signal(ShellSignal::Sigterm)
  }

  /// Consumes the attachment, dropping its subscriptions. Named to match
  /// the spec's `detach()`, even though in Rust this is just drop.
  pub fn detach(self) {}

  /// Waits for the next output chunk or the terminal exit, whichever
  /// comes first. Once `Exit` is returned, every subsequent call returns
  /// the same `Exit` again rather than resuming data delivery — matching
  /// the invariant that no `output` follows an `exit` on one connection.
  pub async fn recv_event(&mut self) -> ShellEvent {
    if let Some(exit) = self.exit_rx.borrow().clone() {
      return ShellEvent::Exit(exit);
    }
    loop {
      tokio::select! {
        biased;
        data = self.output_rx.recv() => {
          match data {
            Ok(bytes) => return ShellEvent::Data(bytes),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => {
              if let Some(exit) = self.exit_rx.borrow().clone() {
                return ShellEvent::Exit(exit);
              }
              return ShellEvent::Closed;
            }
          }
        }
        changed = self.exit_rx.changed() => {
          if changed.is_ok()
            && let Some(exit) = self.exit_rx.borrow().clone()
          {
            return ShellEvent::Exit(exit);
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn echo_shell_produces_output_and_exits() {
    let dir = tempfile::tempdir().unwrap();
    let session = ShellSession::spawn(
      ShellId::new(),
      dir.path().to_path_buf(),
      HashMap::new(),
      Some("/bin/sh".to_string()),
      80,
      24,
      None,
      None,
    )
    .await
    .unwrap();

    let mut attachment = session.attach();
    session
      .write(b"echo hi; exit\n".to_vec())
      .unwrap();

    let mut saw_output = false;
    loop {
      match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        attachment.recv_event(),
      )
      .await
      .expect("shell did not produce an event in time")
      {
        ShellEvent::Data(bytes) => {
          if bytes.windows(2).any(|w| w == b"hi") {
            saw_output = true;
          }
        }
        ShellEvent::Exit(info) => {
          assert_eq!(info.exit_code, 0);
          break;
        }
        ShellEvent::Closed => break,
      }
    }
    assert!(saw_output, "expected to observe echoed output");
    assert_eq!(session.meta().status, ShellStatus::Exited);
  }

  #[tokio::test]
  async fn signal_terminates_a_long_running_shell() {
    let dir = tempfile::tempdir().unwrap();
    let session = ShellSession::spawn(
      ShellId::new(),
      dir.path().to_path_buf(),
      HashMap::new(),
      Some("/bin/sh".to_string()),
      80,
      24,
      None,
      None,
    )
    .await
    .unwrap();

    let mut attachment = session.attach();
    session.signal(ShellSignal::Sigterm);

    let event = tokio::time::timeout(
      std::time::Duration::from_secs(5),
      attachment.recv_event(),
    )
    .await
    .expect("expected exit event");
    assert!(matches!(event, ShellEvent::Exit(_)));
  }
}
