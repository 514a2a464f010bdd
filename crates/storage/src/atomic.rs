use std::path::Path;

use anyhow::Context;
use serde::{Serialize, de::DeserializeOwned};

/// Writes `content` to `path` by writing a sibling temp file then
/// renaming it into place, so concurrent readers never observe a
/// partially-written file. Used for every on-disk store in this crate.
pub async fn write_atomic(
  path: &Path,
  content: &[u8],
) -> anyhow::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await.with_context(|| {
      format!("failed to create {}", parent.display())
    })?;
  }
  let tmp_path = path.with_extension(format!(
    "{}.tmp-{}",
    path.extension().and_then(|e| e.to_str()).unwrap_or("json"),
    std::process::id()
  ));
  tokio::fs::write(&tmp_path, content).await.with_context(|| {
    format!("failed to write {}", tmp_path.display())
  })?;
  tokio::fs::rename(&tmp_path, path).await.with_context(|| {
    format!(
      "failed to rename {} -> {}",
      tmp_path.display(),
      path.display()
    )
  })?;
  Ok(())
}

/// `content` pretty-printed as JSON with a trailing newline, per the
/// wire-format convention used for on-disk state too.
pub fn pretty_json<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
  let mut buf = serde_json::to_vec_pretty(value)?;
  buf.push(b'\n');
  Ok(buf)
}

pub async fn write_json_atomic<T: Serialize>(
  path: &Path,
  value: &T,
) -> anyhow::Result<()> {
  write_atomic(path, &pretty_json(value)?).await
}

/// Reads and parses a JSON file; a missing file yields `T::default()`.
pub async fn read_json_or_default<T: DeserializeOwned + Default>(
  path: &Path,
) -> anyhow::Result<T> {
  match tokio::fs::read(path).await {
    Ok(bytes) => Ok(serde_json::from_slice(&bytes).with_context(|| {
      format!("failed to parse {}", path.display())
    })?),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      Ok(T::default())
    }
    Err(e) => {
      Err(e).with_context(|| format!("failed to read {}", path.display()))
    }
  }
}

/// Writes `content` to `path` only if it differs from the existing
/// contents. Returns whether a write actually happened.
pub async fn write_text_file_if_changed(
  path: &Path,
  content: &str,
) -> anyhow::Result<bool> {
  if let Ok(existing) = tokio::fs::read_to_string(path).await
    && existing == content
  {
    return Ok(false);
  }
  write_atomic(path, content.as_bytes()).await?;
  Ok(true)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sub").join("data.json");
    write_json_atomic(&path, &vec![1, 2, 3]).await.unwrap();
    let back: Vec<i32> = read_json_or_default(&path).await.unwrap();
    assert_eq!(back, vec![1, 2, 3]);
  }

  #[tokio::test]
  async fn missing_file_reads_as_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");
    let back: Vec<i32> = read_json_or_default(&path).await.unwrap();
    assert!(back.is_empty());
  }

  #[tokio::test]
  async fn unchanged_write_reports_no_change() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.txt");
    assert!(write_text_file_if_changed(&path, "hello").await.unwrap());
    assert!(!write_text_file_if_changed(&path, "hello").await.unwrap());
    assert!(write_text_file_if_changed(&path, "world").await.unwrap());
  }
}
