use std::path::PathBuf;

use data_encoding::BASE64URL_NOPAD;
use hack_core::{
  ids::TokenId,
  time::now_ms,
  token::{CreatedToken, TokenRecord, TokenScope, TokenStoreFile},
};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::atomic::{read_json_or_default, write_json_atomic};

const SECRET_BYTES: usize = 32;

fn hash_token(secret: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(secret.as_bytes());
  data_encoding::HEXLOWER.encode(&hasher.finalize())
}

/// `gateway/tokens.json` — gateway bearer tokens. The cleartext secret
/// is returned once, at creation, and never persisted.
pub struct TokenStore {
  path: PathBuf,
}

impl TokenStore {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  async fn load(&self) -> anyhow::Result<TokenStoreFile> {
    read_json_or_default(&self.path).await
  }

  async fn save(&self, file: &TokenStoreFile) -> anyhow::Result<()> {
    write_json_atomic(&self.path, file).await
  }

  pub async fn list(&self) -> anyhow::Result<Vec<TokenRecord>> {
    Ok(self.load().await?.tokens)
  }

  pub async fn create(
    &self,
    scope: TokenScope,
    label: Option<String>,
  ) -> anyhow::Result<CreatedToken> {
    let mut secret_bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut secret_bytes);
    let secret = BASE64URL_NOPAD.encode(&secret_bytes);

    let record = TokenRecord {
      id: TokenId::new(),
      hash: hash_token(&secret),
      scope,
      label,
      created_at: now_ms(),
      last_used_at: None,
      revoked_at: None,
    };

    let mut file = self.load().await?;
    file.tokens.push(record.clone());
    self.save(&file).await?;

    Ok(CreatedToken {
      token: secret,
      record,
    })
  }

  /// Verifies a presented bearer secret. On success, bumps `lastUsedAt`
  /// and returns the matching record. Revoked tokens never verify.
  pub async fn verify(
    &self,
    secret: &str,
  ) -> anyhow::Result<Option<TokenRecord>> {
    let hash = hash_token(secret);
    let mut file = self.load().await?;
    let Some(record) = file
      .tokens
      .iter_mut()
      .find(|t| t.hash == hash && t.is_active())
    else {
      return Ok(None);
    };
    record.last_used_at = Some(now_ms());
    let result = record.clone();
    self.save(&file).await?;
    Ok(Some(result))
  }

  pub async fn revoke(&self, id: TokenId) -> anyhow::Result<bool> {
    let mut file = self.load().await?;
    let Some(record) =
      file.tokens.iter_mut().find(|t| t.id == id && t.is_active())
    else {
      return Ok(false);
    };
    record.revoked_at = Some(now_ms());
    self.save(&file).await?;
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store() -> (tempfile::TempDir, TokenStore) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.json");
    (dir, TokenStore::new(path))
  }

  #[tokio::test]
  async fn created_token_verifies_and_bumps_last_used() {
    let (_dir, store) = store();
    let created = store
      .create(TokenScope::Write, Some("ci".to_string()))
      .await
      .unwrap();
    assert!(created.record.last_used_at.is_none());

    let verified = store.verify(&created.token).await.unwrap().unwrap();
    assert_eq!(verified.id, created.record.id);
    assert!(verified.last_used_at.is_some());
  }

  #[tokio::test]
  async fn wrong_secret_does_not_verify() {
    let (_dir, store) = store();
    store.create(TokenScope::Read, None).await.unwrap();
    assert!(store.verify("not-a-real-token").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn revoked_token_stops_verifying() {
    let (_dir, store) = store();
    let created = store.create(TokenScope::Read, None).await.unwrap();
    assert!(store.revoke(created.record.id).await.unwrap());
    assert!(store.verify(&created.token).await.unwrap().is_none());
    // Revoking again reports no-op.
    assert!(!store.revoke(created.record.id).await.unwrap());
  }

  #[tokio::test]
  async fn each_token_gets_a_distinct_secret() {
    let (_dir, store) = store();
    let a = store.create(TokenScope::Read, None).await.unwrap();
    let b = store.create(TokenScope::Read, None).await.unwrap();
    assert_ne!(a.token, b.token);
    assert_ne!(a.record.hash, b.record.hash);
  }
}
