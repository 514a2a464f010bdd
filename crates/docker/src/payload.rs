use hack_core::runtime::{
  ProjectView, ProjectsPayload, PsContainer, PsPayload, RuntimeSnapshot,
};
use hack_storage::ProjectRegistry;

#[derive(Debug, Clone, Default)]
pub struct ProjectsFilter {
  pub filter: Option<String>,
  pub include_global: bool,
  pub include_unregistered: bool,
}

/// Joins the latest runtime snapshot with the project registry into the
/// payload served by `GET /v1/projects`.
pub async fn get_projects_payload(
  snapshot: &RuntimeSnapshot,
  registry: &ProjectRegistry,
  opts: &ProjectsFilter,
) -> anyhow::Result<ProjectsPayload> {
  let registered = registry.list().await?;

  let mut views = Vec::new();
  for project in &snapshot.projects {
    let registration = project.working_dir.as_deref().and_then(|dir| {
      registered
        .iter()
        .find(|r| r.repo_root.to_string_lossy() == dir)
    });

    if registration.is_none() && !opts.include_unregistered {
      continue;
    }
    if project.is_global && !opts.include_global {
      continue;
    }
    if let Some(filter) = &opts.filter
      && !project.compose_project_name.contains(filter.as_str())
      && registration.is_none_or(|r| !r.name.contains(filter.as_str()))
    {
      continue;
    }

    views.push(ProjectView {
      project_id: registration.map(|r| r.id),
      name: registration.map(|r| r.name.clone()),
      compose_project_name: project.compose_project_name.clone(),
      working_dir: project.working_dir.clone(),
      is_global: project.is_global,
      registered: registration.is_some(),
      services: project.services.clone(),
    });
  }

  Ok(ProjectsPayload {
    updated_at_ms: snapshot.updated_at_ms,
    projects: views,
  })
}

/// Container list for a single compose project, sorted by
/// `(service, name)`, as served by `GET /v1/ps`.
pub fn get_ps_payload(
  snapshot: &RuntimeSnapshot,
  compose_project: &str,
) -> PsPayload {
  let Some(project) = snapshot
    .projects
    .iter()
    .find(|p| p.compose_project_name == compose_project)
  else {
    return PsPayload {
      compose_project: compose_project.to_string(),
      containers: Vec::new(),
    };
  };

  let mut containers: Vec<PsContainer> = project
    .services
    .iter()
    .flat_map(|(service, runtime_service)| {
      runtime_service.containers.iter().map(move |c| PsContainer {
        service: service.clone(),
        name: c.name.clone(),
        id: c.id.clone(),
        state: c.state.clone(),
        status: c.status.clone(),
        ports: c.ports.clone(),
      })
    })
    .collect();

  containers.sort_by(|a, b| {
    a.service.cmp(&b.service).then_with(|| a.name.cmp(&b.name))
  });

  PsPayload {
    compose_project: compose_project.to_string(),
    containers,
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use hack_core::runtime::{RuntimeContainer, RuntimeProject, RuntimeService};

  use super::*;

  fn container(name: &str) -> RuntimeContainer {
    RuntimeContainer {
      id: format!("id-{name}"),
      name: name.to_string(),
      state: "running".to_string(),
      status: "Up 2 minutes".to_string(),
      ports: Vec::new(),
    }
  }

  #[test]
  fn ps_payload_sorts_by_service_then_name() {
    let mut services = BTreeMap::new();
    services.insert(
      "web".to_string(),
      RuntimeService {
        containers: vec![container("web-2"), container("web-1")],
      },
    );
    services.insert(
      "api".to_string(),
      RuntimeService {
        containers: vec![container("api-1")],
      },
    );
    let snapshot = RuntimeSnapshot {
      updated_at_ms: 0,
      projects: vec![RuntimeProject {
        compose_project_name: "demo".to_string(),
        working_dir: None,
        is_global: false,
        services,
      }],
    };

    let payload = get_ps_payload(&snapshot, "demo");
    let names: Vec<&str> =
      payload.containers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["api-1", "web-1", "web-2"]);
  }

  #[test]
  fn ps_payload_for_unknown_project_is_empty() {
    let snapshot = RuntimeSnapshot::default();
    let payload = get_ps_payload(&snapshot, "nope");
    assert!(payload.containers.is_empty());
  }
}
