use std::{io, os::unix::process::ExitStatusExt, process::Output};

/// Captured result of running a command to completion.
#[derive(Debug, Clone)]
pub struct CommandOutput {
  pub stdout: String,
  pub stderr: String,
  pub success: bool,
}

impl CommandOutput {
  pub fn from_output(output: io::Result<Output>) -> Self {
    match output {
      Ok(output) => Self {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
      },
      Err(e) => Self::from_err(e),
    }
  }

  pub fn from_err(e: io::Error) -> Self {
    Self {
      stdout: String::new(),
      stderr: format!("{e}"),
      success: std::process::ExitStatus::from_raw(1).success(),
    }
  }
}
