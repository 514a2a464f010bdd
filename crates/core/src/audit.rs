use serde::{Deserialize, Serialize};

use crate::ids::TokenId;

/// One line of `gateway/audit.jsonl`. Emitted for every gateway (TCP)
/// request, never for local Unix-socket requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub ts: i64,
  pub method: String,
  /// Sanitized — `token`/`access_token` query parameters are stripped.
  pub path: String,
  pub status: u16,
  pub token_id: Option<TokenId>,
  pub remote_address: Option<String>,
  pub user_agent: Option<String>,
}
