use anyhow::Context;
use bollard::Docker;

/// Thin wrapper over a bollard connection, so the rest of the crate
/// never touches `bollard::Docker` directly.
pub struct DockerClient {
  docker: Docker,
}

impl DockerClient {
  pub fn connect() -> anyhow::Result<Self> {
    let docker = Docker::connect_with_defaults().context(
      "failed to connect to docker api, container monitoring will return empty results",
    )?;
    Ok(Self { docker })
  }

  pub fn inner(&self) -> &Docker {
    &self.docker
  }
}
