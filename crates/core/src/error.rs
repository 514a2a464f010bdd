use thiserror::Error;

/// Shared error type for the control-plane core.
///
/// Kept transport-agnostic (no `axum` dependency here, per
/// `hack-core`'s "shared domain types with no I/O" role) — `hack-daemon`
/// maps each variant to the HTTP status + JSON body from the spec's
/// error-handling table.
#[derive(Debug, Error)]
pub enum Error {
  #[error("not found")]
  NotFound,

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("{message}")]
  Validation {
    code: &'static str,
    message: String,
  },

  #[error("{0}")]
  Auth(&'static str),

  #[error("{0}")]
  Forbidden(&'static str),

  #[error("upgrade required")]
  UpgradeRequired,

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  /// Machine-readable error code, as surfaced in `{"error": "<code>"}`.
  pub fn code(&self) -> &'static str {
    match self {
      Error::NotFound => "not_found",
      Error::Conflict(_) => "conflict",
      Error::Validation { code, .. } => code,
      Error::Auth(code) => code,
      Error::Forbidden(code) => code,
      Error::UpgradeRequired => "upgrade_required",
      Error::Io(_) => "io_error",
      Error::Json(_) => "invalid_json",
      Error::Other(_) => "internal_error",
    }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Error::Validation {
      code: "invalid_request",
      message: message.into(),
    }
  }

  pub fn validation_with_code(
    code: &'static str,
    message: impl Into<String>,
  ) -> Self {
    Error::Validation {
      code,
      message: message.into(),
    }
  }
}
