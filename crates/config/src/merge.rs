use std::path::Path;

use hack_core::config::{HackConfig, HackConfigLayer};

use crate::error::ConfigError;

/// Loads one `hack.config.json` layer. A missing file is `{}` (logged at
/// debug); malformed JSON is a fatal [`ConfigError`].
pub fn load_layer(path: &Path) -> Result<HackConfigLayer, ConfigError> {
  let raw = match std::fs::read_to_string(path) {
    Ok(raw) => raw,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      tracing::debug!(path = %path.display(), "no config file, using defaults");
      return Ok(HackConfigLayer::default());
    }
    Err(e) => {
      return Err(ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
      });
    }
  };
  serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
    path: path.to_path_buf(),
    source: e,
  })
}

/// Merges a global layer with an optional project layer per the
/// precedence rules in `SPEC_FULL.md` §4.1:
///
/// - `supervisor.*` and `extensions.<id>.{enabled,cliNamespace,config}`:
///   project overrides global.
/// - `gateway.enabled`: project-scoped opt-in — project value wins if
///   set, else falls back to global (default `false`).
/// - `gateway.{bind,port,allowWrites}`: global-only; a project value is
///   ignored with a warning.
/// - an extension id marked `globalOnly` in the global layer cannot be
///   overridden project-side; the attempt is ignored with a warning.
pub fn merge(
  global: &HackConfigLayer,
  project: Option<&HackConfigLayer>,
) -> HackConfig {
  let mut merged = HackConfig::default();

  if let Some(gw) = &global.gateway {
    if let Some(enabled) = gw.enabled {
      merged.gateway.enabled = enabled;
    }
    if let Some(bind) = &gw.bind {
      merged.gateway.bind = bind.clone();
    }
    if let Some(port) = gw.port {
      merged.gateway.port = port;
    }
    if let Some(allow_writes) = gw.allow_writes {
      merged.gateway.allow_writes = allow_writes;
    }
  }

  if let Some(sv) = &global.supervisor {
    if let Some(n) = sv.max_concurrent_jobs {
      merged.supervisor.max_concurrent_jobs = n;
    }
    if let Some(n) = sv.logs_max_bytes {
      merged.supervisor.logs_max_bytes = n;
    }
  }

  merged.extensions = global.extensions.clone();

  let Some(project) = project else {
    return merged;
  };

  if let Some(gw) = &project.gateway {
    if let Some(enabled) = gw.enabled {
      merged.gateway.enabled = enabled;
    }
    if gw.bind.is_some() || gw.port.is_some() || gw.allow_writes.is_some()
    {
      tracing::warn!(
        "project hack.config.json sets global-only gateway.{{bind,port,allowWrites}} keys; ignoring"
      );
    }
  }

  if let Some(sv) = &project.supervisor {
    if let Some(n) = sv.max_concurrent_jobs {
      merged.supervisor.max_concurrent_jobs = n;
    }
    if let Some(n) = sv.logs_max_bytes {
      merged.supervisor.logs_max_bytes = n;
    }
  }

  for (id, section) in &project.extensions {
    match merged.extensions.get(id) {
      Some(existing) if existing.global_only => {
        tracing::warn!(
          extension = %id,
          "project hack.config.json attempts to override global-only extension; ignoring"
        );
      }
      _ => {
        merged.extensions.insert(id.clone(), section.clone());
      }
    }
  }

  merged
}

#[cfg(test)]
mod tests {
  use hack_core::config::{ExtensionSection, GatewayLayer, SupervisorLayer};

  use super::*;

  #[test]
  fn project_opts_into_gateway() {
    let global = HackConfigLayer::default();
    let project = HackConfigLayer {
      gateway: Some(GatewayLayer {
        enabled: Some(true),
        ..Default::default()
      }),
      ..Default::default()
    };
    let merged = merge(&global, Some(&project));
    assert!(merged.gateway.enabled);
    // Global-only keys stay at their defaults.
    assert_eq!(merged.gateway.port, 7788);
  }

  #[test]
  fn project_cannot_override_global_only_gateway_keys() {
    let global = HackConfigLayer {
      gateway: Some(GatewayLayer {
        bind: Some("0.0.0.0".into()),
        port: Some(9000),
        allow_writes: Some(true),
        ..Default::default()
      }),
      ..Default::default()
    };
    let project = HackConfigLayer {
      gateway: Some(GatewayLayer {
        port: Some(1234),
        ..Default::default()
      }),
      ..Default::default()
    };
    let merged = merge(&global, Some(&project));
    assert_eq!(merged.gateway.port, 9000);
    assert_eq!(merged.gateway.bind, "0.0.0.0");
    assert!(merged.gateway.allow_writes);
  }

  #[test]
  fn project_overrides_supervisor() {
    let global = HackConfigLayer::default();
    let project = HackConfigLayer {
      supervisor: Some(SupervisorLayer {
        max_concurrent_jobs: Some(10),
        logs_max_bytes: None,
      }),
      ..Default::default()
    };
    let merged = merge(&global, Some(&project));
    assert_eq!(merged.supervisor.max_concurrent_jobs, 10);
    assert_eq!(merged.supervisor.logs_max_bytes, 5 * 1024 * 1024);
  }

  #[test]
  fn global_only_extension_id_cannot_be_overridden() {
    let mut global = HackConfigLayer::default();
    global.extensions.insert(
      "tailscale".to_string(),
      ExtensionSection {
        enabled: true,
        global_only: true,
        ..Default::default()
      },
    );
    let mut project = HackConfigLayer::default();
    project.extensions.insert(
      "tailscale".to_string(),
      ExtensionSection {
        enabled: false,
        ..Default::default()
      },
    );
    let merged = merge(&global, Some(&project));
    assert!(merged.extensions.get("tailscale").unwrap().enabled);
  }

  #[test]
  fn missing_file_is_all_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let layer = load_layer(&dir.path().join("hack.config.json")).unwrap();
    assert!(layer.gateway.is_none());
  }

  #[test]
  fn malformed_json_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hack.config.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(load_layer(&path).is_err());
  }
}
