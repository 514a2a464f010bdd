//! In-place-updated counters served by `GET /v1/status` and
//! `GET /v1/metrics` (`SPEC_FULL.md` §6). Cheap enough to bump on every
//! request/event without a lock — everything here is a plain atomic.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use hack_core::time::now_ms;
use serde::Serialize;

pub struct Metrics {
  started_at_ms: i64,
  last_refresh_at: AtomicI64,
  refresh_failures: AtomicU64,
  last_event_at: AtomicI64,
  events_seen: AtomicU64,
  streams_active: AtomicU64,
}

impl Metrics {
  pub fn new(started_at_ms: i64) -> Self {
    Self {
      started_at_ms,
      last_refresh_at: AtomicI64::new(0),
      refresh_failures: AtomicU64::new(0),
      last_event_at: AtomicI64::new(0),
      events_seen: AtomicU64::new(0),
      streams_active: AtomicU64::new(0),
    }
  }

  pub fn started_at_ms(&self) -> i64 {
    self.started_at_ms
  }

  pub fn record_refresh(&self) {
    self.last_refresh_at.store(now_ms(), Ordering::SeqCst);
  }

  pub fn record_refresh_failure(&self) {
    self.refresh_failures.fetch_add(1, Ordering::SeqCst);
  }

  pub fn record_docker_event(&self) {
    self.last_event_at.store(now_ms(), Ordering::SeqCst);
    self.events_seen.fetch_add(1, Ordering::SeqCst);
  }

  pub fn stream_opened(&self) {
    self.streams_active.fetch_add(1, Ordering::SeqCst);
  }

  pub fn stream_closed(&self) {
    self.streams_active.fetch_sub(1, Ordering::SeqCst);
  }

  pub fn snapshot(
    &self,
    cache_updated_at: Option<i64>,
    refresh_count: u64,
  ) -> MetricsSnapshot {
    let now = now_ms();
    let last_refresh_at = self.last_refresh_at.load(Ordering::SeqCst);
    let last_event_at = self.last_event_at.load(Ordering::SeqCst);
    MetricsSnapshot {
      status: "ok",
      started_at: self.started_at_ms,
      uptime_ms: (now - self.started_at_ms).max(0),
      cache_updated_at,
      cache_age_ms: cache_updated_at.map(|t| (now - t).max(0)),
      last_refresh_at: (last_refresh_at > 0).then_some(last_refresh_at),
      refresh_count,
      refresh_failures: self.refresh_failures.load(Ordering::SeqCst),
      last_event_at: (last_event_at > 0).then_some(last_event_at),
      events_seen: self.events_seen.load(Ordering::SeqCst),
      streams_active: self.streams_active.load(Ordering::SeqCst),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsSnapshot {
  pub status: &'static str,
  pub started_at: i64,
  pub uptime_ms: i64,
  pub cache_updated_at: Option<i64>,
  pub cache_age_ms: Option<i64>,
  pub last_refresh_at: Option<i64>,
  pub refresh_count: u64,
  pub refresh_failures: u64,
  pub last_event_at: Option<i64>,
  pub events_seen: u64,
  pub streams_active: u64,
}
