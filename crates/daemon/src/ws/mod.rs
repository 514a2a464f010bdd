//! WebSocket stream bridges (`SPEC_FULL.md` §4.12): one per-connection
//! state machine for job log/event streaming, one for shell bidi I/O.
//! Grounded on `bin/core/src/ws/terminal.rs`'s `socket.split()` +
//! `tokio::select!` shape, retargeted from forwarding to a Periphery
//! connection onto polling the job store / a shell session directly.

use axum::http::{HeaderMap, header};

pub mod job_stream;
pub mod shell_stream;

/// A request is a genuine WebSocket upgrade attempt iff it carries
/// `Upgrade: websocket`. Anything else hitting a stream route gets a
/// plain 426, per the spec's error-handling table.
pub(crate) fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
  headers
    .get(header::UPGRADE)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  #[test]
  fn detects_websocket_upgrade_case_insensitively() {
    let mut headers = HeaderMap::new();
    headers.insert(header::UPGRADE, HeaderValue::from_static("WebSocket"));
    assert!(is_websocket_upgrade(&headers));
  }

  #[test]
  fn missing_upgrade_header_is_rejected() {
    assert!(!is_websocket_upgrade(&HeaderMap::new()));
  }

  #[test]
  fn non_websocket_upgrade_value_is_rejected() {
    let mut headers = HeaderMap::new();
    headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
    assert!(!is_websocket_upgrade(&headers));
  }
}
