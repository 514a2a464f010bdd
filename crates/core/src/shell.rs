use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ProjectId, ShellId};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ShellStatus {
  Running,
  Exited,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellMeta {
  pub shell_id: ShellId,
  pub status: ShellStatus,
  pub project_id: Option<ProjectId>,
  pub cwd: String,
  pub shell: String,
  pub cols: u16,
  pub rows: u16,
  pub pid: Option<u32>,
  pub exit_code: Option<i32>,
  /// Present (possibly null) once `status = exited`.
  pub signal: Option<String>,
  pub created_at: i64,
  pub updated_at: i64,
}

/// Request body for `POST .../shells`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateShellRequest {
  pub cwd: Option<String>,
  #[serde(default)]
  pub env: HashMap<String, String>,
  pub shell: Option<String>,
  pub cols: Option<u16>,
  pub rows: Option<u16>,
}

/// POSIX signals forwardable over a shell-stream WebSocket, per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellSignal {
  Sigint,
  Sigterm,
  Sigkill,
  Sighup,
  Sigquit,
  Sigusr1,
  Sigusr2,
  Sigtstp,
}

impl ShellSignal {
  pub fn parse(name: &str) -> Option<Self> {
    Some(match name.to_ascii_uppercase().as_str() {
      "SIGINT" => Self::Sigint,
      "SIGTERM" => Self::Sigterm,
      "SIGKILL" => Self::Sigkill,
      "SIGHUP" => Self::Sighup,
      "SIGQUIT" => Self::Sigquit,
      "SIGUSR1" => Self::Sigusr1,
      "SIGUSR2" => Self::Sigusr2,
      "SIGTSTP" => Self::Sigtstp,
      _ => return None,
    })
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Sigint => "SIGINT",
      Self::Sigterm => "SIGTERM",
      Self::Sigkill => "SIGKILL",
      Self::Sighup => "SIGHUP",
      Self::Sigquit => "SIGQUIT",
      Self::Sigusr1 => "SIGUSR1",
      Self::Sigusr2 => "SIGUSR2",
      Self::Sigtstp => "SIGTSTP",
    }
  }
}
