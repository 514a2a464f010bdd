//! `hackd`: the control-plane daemon binary. Boots the on-disk stores,
//! serves the shared route table over a local Unix socket, and — once at
//! least one project opts into it — over a TCP gateway too. Grounded on
//! `bin/periphery/src/main.rs`'s `app()`/`main()` split and on
//! `bin/periphery/src/connection/mod.rs`'s dual-listener bring-up (the
//! TLS/login-handshake parts of that module don't apply here — the
//! gateway authenticates with bearer tokens, not a passkey handshake).

#[macro_use]
extern crate tracing;

mod api;
mod error;
mod gateway;
mod metrics;
mod routes;
mod state;
mod ws;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use hack_config::HackPaths;
use hack_core::logging::{LogConfig, LogLevel, StdioLogMode};
use hack_docker::{DockerClient, EventWatcher, RuntimeCache};
use hack_storage::{AuditLog, ProjectRegistry, TokenStore};
use state::AppState;
use tokio::net::{TcpListener, UnixListener};

/// `--log-mode` values, per `SPEC_FULL.md` §4.14.
#[derive(Clone, Copy, clap::ValueEnum)]
enum LogModeArg {
  Standard,
  Json,
  None,
}

impl From<LogModeArg> for StdioLogMode {
  fn from(mode: LogModeArg) -> Self {
    match mode {
      LogModeArg::Standard => StdioLogMode::Standard,
      LogModeArg::Json => StdioLogMode::Json,
      LogModeArg::None => StdioLogMode::None,
    }
  }
}

#[derive(Parser)]
#[command(name = "hackd", version, about = "hack control-plane daemon")]
struct Cli {
  /// Overrides the resolved log level (trace, debug, info, warn, error).
  #[arg(long)]
  log_level: Option<String>,

  /// Overrides the per-user state root (default `~/.hack/daemon`, or
  /// `HACK_STATE_ROOT` if set).
  #[arg(long)]
  state_root: Option<PathBuf>,

  /// Run in the foreground. No daemonize/double-fork path is
  /// implemented by this binary (out of scope per §1), so this flag
  /// exists for CLI parity with the spec and accepts only `true`.
  #[arg(long, default_value_t = true)]
  foreground: bool,

  /// Stdio log format: standard, json, or none.
  #[arg(long, value_enum)]
  log_mode: Option<LogModeArg>,

  /// Use the multi-line "pretty" formatter instead of the compact one.
  #[arg(long)]
  pretty: bool,
}

fn parse_log_level(value: &str) -> Option<LogLevel> {
  Some(match value.to_ascii_lowercase().as_str() {
    "trace" => LogLevel::Trace,
    "debug" => LogLevel::Debug,
    "info" => LogLevel::Info,
    "warn" => LogLevel::Warn,
    "error" => LogLevel::Error,
    _ => return None,
  })
}

/// `--log-level` wins over `HACK_LOG_LEVEL`, which wins over the default.
/// `--log-mode` wins over `HACK_LOG_JSON=1` (JSON lines, for daemons
/// running under a log collector rather than a terminal), which wins
/// over the default. `--pretty` switches on the multi-line formatter.
fn resolve_log_config(cli: &Cli) -> LogConfig {
  let mut config = LogConfig::default();
  let level = cli
    .log_level
    .clone()
    .or_else(|| std::env::var("HACK_LOG_LEVEL").ok());
  if let Some(level) = level.as_deref().and_then(parse_log_level) {
    config.level = level;
  }
  match cli.log_mode {
    Some(mode) => config.stdio = mode.into(),
    None if std::env::var("HACK_LOG_JSON")
      .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) =>
    {
      config.stdio = StdioLogMode::Json;
    }
    None => {}
  }
  if cli.pretty {
    config.pretty = true;
  }
  config
}

/// Checks liveness by sending signal 0, per `SPEC_FULL.md` §6's
/// "Liveness is determined by sending signal 0 to the pid."
fn is_process_alive(pid: i32) -> bool {
  nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

/// Acquires `hackd.pid`, refusing to start if it already names a live
/// process, per `SPEC_FULL.md` §4.14's startup sequence. A pid file left
/// behind by a process that is no longer alive (crash, `kill -9`) is
/// treated as stale and overwritten.
async fn acquire_pid_lock(paths: &HackPaths) -> anyhow::Result<()> {
  let pid_path = paths.pid_file();
  match tokio::fs::read_to_string(&pid_path).await {
    Ok(contents) => {
      if let Some(pid) = contents.trim().parse::<i32>().ok().filter(|p| *p > 0)
        && is_process_alive(pid)
      {
        anyhow::bail!(
          "hackd is already running (pid {pid}, see {})",
          pid_path.display()
        );
      }
    }
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(e) => {
      return Err(e).context("failed to read existing pid file");
    }
  }
  tokio::fs::write(&pid_path, std::process::id().to_string())
    .await
    .context("failed to write pid file")?;
  Ok(())
}

async fn app(cli: Cli) -> anyhow::Result<()> {
  let paths = HackPaths::resolve(cli.state_root.clone())?;
  paths.ensure_daemon_dirs()?;
  logger::init(&resolve_log_config(&cli))?;

  info!(version = state::VERSION, "hackd starting");

  acquire_pid_lock(&paths).await?;

  let global_config = hack_config::load_effective(&paths, None)?;
  let registry = Arc::new(ProjectRegistry::new(paths.registry_file()));
  let tokens = Arc::new(TokenStore::new(paths.tokens_file()));
  let audit = Arc::new(AuditLog::new(paths.audit_file()));

  let docker_client = DockerClient::connect()?;
  let docker = Arc::new(RuntimeCache::new(docker_client, registry.clone()));

  let state = Arc::new(AppState::new(
    paths.clone(),
    global_config,
    registry,
    tokens,
    audit,
    docker.clone(),
  ));

  state.refresh_enabled_projects().await;
  docker.refresh("startup").await;
  state.metrics.record_refresh();

  let event_docker = docker.clone();
  let event_metrics = state.metrics.clone();
  let event_watcher = EventWatcher::spawn(move |_line| {
    event_metrics.record_docker_event();
    event_docker.on_docker_event();
  });

  let socket_path = paths.socket_path();
  let _ = tokio::fs::remove_file(&socket_path).await;
  let unix_listener = UnixListener::bind(&socket_path)
    .with_context(|| format!("failed to bind {}", socket_path.display()))?;
  info!(path = %socket_path.display(), "listening on unix socket");

  let local_router = routes::build_router(state.clone());
  let local_server = tokio::spawn(async move {
    axum::serve(unix_listener, local_router.into_make_service())
      .await
      .context("local server crashed")
  });

  let gateway_server = if state.enabled_projects.read().await.is_empty() {
    info!("no project enables the gateway at startup; TCP listener not opened");
    None
  } else {
    let addr: SocketAddr = format!(
      "{}:{}",
      state.global_config.gateway.bind, state.global_config.gateway.port
    )
    .parse()
    .context("invalid gateway bind address")?;
    let tcp_listener = TcpListener::bind(addr)
      .await
      .with_context(|| format!("failed to bind gateway on {addr}"))?;
    info!(%addr, "gateway listening");

    let gateway_router = routes::build_router(state.clone()).layer(
      axum::middleware::from_fn_with_state(state.clone(), gateway::auth_and_audit),
    );
    Some(tokio::spawn(async move {
      axum::serve(
        tcp_listener,
        gateway_router.into_make_service_with_connect_info::<SocketAddr>(),
      )
      .await
      .context("gateway server crashed")
    }))
  };

  wait_for_shutdown_signal().await;
  info!("shutdown signal received, stopping");

  event_watcher.stop().await;
  local_server.abort();
  if let Some(handle) = gateway_server {
    handle.abort();
  }
  let _ = tokio::fs::remove_file(&socket_path).await;
  let _ = tokio::fs::remove_file(paths.pid_file()).await;

  Ok(())
}

async fn wait_for_shutdown_signal() {
  let ctrl_c = async {
    let _ = tokio::signal::ctrl_c().await;
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut stream) => {
        stream.recv().await;
      }
      Err(e) => {
        tracing::warn!(error = %e, "failed to install SIGTERM handler");
        std::future::pending::<()>().await;
      }
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {}
    _ = terminate => {}
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  app(cli).await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_known_levels_case_insensitively() {
    assert!(matches!(parse_log_level("DEBUG"), Some(LogLevel::Debug)));
    assert!(matches!(parse_log_level("warn"), Some(LogLevel::Warn)));
    assert!(parse_log_level("bogus").is_none());
  }

  fn base_cli() -> Cli {
    Cli {
      log_level: None,
      state_root: None,
      foreground: true,
      log_mode: None,
      pretty: false,
    }
  }

  #[test]
  fn cli_flag_overrides_the_default_level() {
    let cli = Cli {
      log_level: Some("error".to_string()),
      ..base_cli()
    };
    let config = resolve_log_config(&cli);
    assert!(matches!(config.level, LogLevel::Error));
  }

  #[test]
  fn no_flag_keeps_the_default_level() {
    let cli = base_cli();
    assert_eq!(resolve_log_config(&cli).level, LogConfig::default().level);
  }

  #[test]
  fn log_mode_flag_overrides_json_env() {
    let cli = Cli {
      log_mode: Some(LogModeArg::None),
      ..base_cli()
    };
    assert!(matches!(resolve_log_config(&cli).stdio, StdioLogMode::None));
  }

  #[test]
  fn pretty_flag_enables_pretty_formatting() {
    let cli = Cli {
      pretty: true,
      ..base_cli()
    };
    assert!(resolve_log_config(&cli).pretty);
  }
}
