use std::collections::HashMap;

use bollard::{container::ListContainersOptions, models::ContainerSummary};
use command::run_standard_command;
use hack_core::runtime::RuntimePort;
use serde::{Deserialize, Serialize};

use crate::client::DockerClient;

/// One entry of `docker compose ls --all --format json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeProject {
  #[serde(default, alias = "Name")]
  pub name: String,
  #[serde(alias = "Status")]
  pub status: Option<String>,
  #[serde(default, alias = "ConfigFiles")]
  pub config_files: String,
  #[serde(default, alias = "WorkingDir")]
  pub working_dir: String,
}

pub async fn list_compose_projects() -> anyhow::Result<Vec<ComposeProject>> {
  let res =
    run_standard_command("docker compose ls --all --format json", None)
      .await;

  if !res.success {
    return Err(anyhow::anyhow!(
      "docker compose ls failed: {}",
      res.stderr
    ));
  }

  let projects: Vec<ComposeProject> =
    serde_json::from_str(&res.stdout).map_err(|e| {
      anyhow::anyhow!(
        "failed to parse 'docker compose ls' output: {e}\n{}",
        res.stdout
      )
    })?;

  Ok(projects.into_iter().filter(|p| !p.name.is_empty()).collect())
}

/// Lists containers labeled as belonging to `compose_project`, via the
/// Docker Engine API rather than `docker ps` text parsing.
pub async fn list_project_containers(
  client: &DockerClient,
  compose_project: &str,
) -> anyhow::Result<Vec<ContainerSummary>> {
  let mut filters = HashMap::new();
  filters.insert(
    "label".to_string(),
    vec![format!("com.docker.compose.project={compose_project}")],
  );

  let options = ListContainersOptions {
    all: true,
    filters,
    ..Default::default()
  };

  Ok(client.inner().list_containers(Some(options)).await?)
}

pub fn service_name(container: &ContainerSummary) -> Option<String> {
  container
    .labels
    .as_ref()
    .and_then(|labels| labels.get("com.docker.compose.service"))
    .cloned()
}

pub fn container_ports(container: &ContainerSummary) -> Vec<RuntimePort> {
  container
    .ports
    .clone()
    .unwrap_or_default()
    .into_iter()
    .map(|p| RuntimePort {
      private_port: p.private_port,
      public_port: p.public_port,
      protocol: p
        .typ
        .map(|t| format!("{t:?}").to_lowercase())
        .unwrap_or_else(|| "tcp".to_string()),
    })
    .collect()
}

pub fn container_name(container: &ContainerSummary) -> String {
  container
    .names
    .as_ref()
    .and_then(|names| names.first())
    .map(|n| n.trim_start_matches('/').to_string())
    .unwrap_or_else(|| container.id.clone().unwrap_or_default())
}
