use serde::{Deserialize, Serialize};

use crate::ids::TokenId;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
  Read,
  Write,
}

impl TokenScope {
  pub fn as_str(&self) -> &'static str {
    match self {
      TokenScope::Read => "read",
      TokenScope::Write => "write",
    }
  }
}

/// Persisted token record. The cleartext secret is never stored; only
/// its sha256 hash, hex-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
  pub id: TokenId,
  pub hash: String,
  pub scope: TokenScope,
  pub label: Option<String>,
  pub created_at: i64,
  pub last_used_at: Option<i64>,
  pub revoked_at: Option<i64>,
}

impl TokenRecord {
  pub fn is_active(&self) -> bool {
    self.revoked_at.is_none()
  }
}

/// On-disk shape of `gateway/tokens.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStoreFile {
  pub version: u32,
  pub tokens: Vec<TokenRecord>,
}

impl Default for TokenStoreFile {
  fn default() -> Self {
    Self {
      version: 1,
      tokens: Vec::new(),
    }
  }
}

/// Returned exactly once at creation time; cleartext is never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedToken {
  pub token: String,
  pub record: TokenRecord,
}
