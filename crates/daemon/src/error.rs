//! Maps `hack_core::Error` onto the HTTP status + JSON body table from
//! `SPEC_FULL.md` §7. Kept as a thin `IntoResponse` wrapper so handlers can
//! propagate with `?` and still get the right status code.

use axum::{http::StatusCode, response::IntoResponse};
use hack_core::Error;

use crate::routes::json_response;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
  fn from(e: Error) -> Self {
    Self(e)
  }
}

impl From<anyhow::Error> for ApiError {
  fn from(e: anyhow::Error) -> Self {
    Self(Error::Other(e))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> axum::response::Response {
    let status = match &self.0 {
      Error::NotFound => StatusCode::NOT_FOUND,
      Error::Conflict(_) => StatusCode::CONFLICT,
      Error::Validation { .. } => StatusCode::BAD_REQUEST,
      Error::Auth(_) => StatusCode::UNAUTHORIZED,
      Error::Forbidden(_) => StatusCode::FORBIDDEN,
      Error::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
      Error::Io(_) | Error::Json(_) | Error::Other(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    let body = serde_json::json!({
      "error": self.0.code(),
      "message": self.0.to_string(),
    });
    json_response(status, &body)
  }
}

pub type ApiResult<T> = Result<T, ApiError>;
