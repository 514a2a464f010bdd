use serde::{Deserialize, Serialize};

/// Mirrors the teacher's `komodo_client::entities::logger::LogConfig`,
/// minus the OTLP fields (no OTLP collector is in scope for this daemon,
/// see `DESIGN.md`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogConfig {
  pub level: LogLevel,
  pub stdio: StdioLogMode,
  /// Use the multi-line "pretty" formatter instead of the compact one.
  pub pretty: bool,
  /// Include the module path (`target`) in each log line.
  pub location: bool,
  /// Enable ANSI color codes in formatted output.
  pub ansi: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: LogLevel::Info,
      stdio: StdioLogMode::Standard,
      pretty: false,
      location: false,
      ansi: true,
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Trace,
  Debug,
  #[default]
  Info,
  Warn,
  Error,
}

impl From<LogLevel> for tracing::Level {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Trace => tracing::Level::TRACE,
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Error => tracing::Level::ERROR,
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}
