use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `gateway` section. `bind`/`port`/`allow_writes` are global-only; a
/// project file may only set `enabled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewaySection {
  pub enabled: bool,
  pub bind: String,
  pub port: u16,
  pub allow_writes: bool,
}

impl Default for GatewaySection {
  fn default() -> Self {
    Self {
      enabled: false,
      bind: "127.0.0.1".to_string(),
      port: 7788,
      allow_writes: false,
    }
  }
}

/// `supervisor` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SupervisorSection {
  pub max_concurrent_jobs: usize,
  pub logs_max_bytes: u64,
}

impl Default for SupervisorSection {
  fn default() -> Self {
    Self {
      max_concurrent_jobs: 4,
      logs_max_bytes: 5 * 1024 * 1024,
    }
  }
}

/// One `extensions.<id>` entry. The `config` blob is opaque — this crate
/// does not know what any extension is, only preserves and merges it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionSection {
  pub enabled: bool,
  pub cli_namespace: Option<String>,
  pub config: serde_json::Value,
  /// Set on an id that is only meaningful at the global layer (e.g. one
  /// tied to daemon-wide process management); project files cannot
  /// override such an id and attempts are ignored with a warning.
  pub global_only: bool,
}

/// The merged, effective control-plane config for one project (or, at
/// the global layer alone, the daemon-wide defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HackConfig {
  pub gateway: GatewaySection,
  pub supervisor: SupervisorSection,
  pub extensions: BTreeMap<String, ExtensionSection>,
}

/// Raw shape of one `hack.config.json` layer, before merge. Every field
/// is optional so a missing file parses as `{}` (all-default).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HackConfigLayer {
  pub gateway: Option<GatewayLayer>,
  pub supervisor: Option<SupervisorLayer>,
  pub extensions: BTreeMap<String, ExtensionSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayLayer {
  pub enabled: Option<bool>,
  pub bind: Option<String>,
  pub port: Option<u16>,
  pub allow_writes: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SupervisorLayer {
  pub max_concurrent_jobs: Option<usize>,
  pub logs_max_bytes: Option<u64>,
}
