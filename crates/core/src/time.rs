use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix timestamp in milliseconds.
///
/// The teacher's entities crate sources this from `komodo_timestamp()`;
/// that helper wasn't part of the retrieval pack, so it's reconstructed
/// locally from `SystemTime`.
pub fn now_ms() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as i64)
    .unwrap_or(0)
}
