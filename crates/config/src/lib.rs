//! State-root resolution and global/project `hack.config.json` loading
//! + merge, per `SPEC_FULL.md` §4.1.

pub mod error;
pub mod merge;
pub mod paths;

use std::path::Path;

pub use error::ConfigError;
use hack_core::config::HackConfig;
pub use merge::{load_layer, merge};
pub use paths::HackPaths;

/// Loads and merges the global layer with a project's layer (if
/// `project_dir` is given), returning the fully effective config.
pub fn load_effective(
  paths: &HackPaths,
  project_dir: Option<&Path>,
) -> Result<HackConfig, ConfigError> {
  let global = load_layer(&paths.global_config_file())?;
  let project = match project_dir {
    Some(dir) => {
      Some(load_layer(&HackPaths::project_config_file(dir))?)
    }
    None => None,
  };
  Ok(merge(&global, project.as_ref()))
}
