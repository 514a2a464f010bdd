use std::path::PathBuf;

use thiserror::Error;

/// Malformed config JSON is startup-fatal: the daemon refuses to boot
/// rather than silently discard a project's settings. A missing file is
/// not an error — see [`crate::load_layer`].
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("malformed config JSON in {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}
