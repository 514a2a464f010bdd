use std::path::{Path, PathBuf};

use hack_core::{
  ids::ProjectId,
  project::{ProjectRecord, ProjectsRegistryFile, UpsertOutcome},
  time::now_ms,
};
use validations::{StringValidator, StringValidatorMatches};

use crate::atomic::{read_json_or_default, write_json_atomic};

/// `~/.hack/projects.json` — the shared registry of known projects,
/// keyed by a unique case-folded name.
pub struct ProjectRegistry {
  path: PathBuf,
}

impl ProjectRegistry {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  async fn load(&self) -> anyhow::Result<ProjectsRegistryFile> {
    read_json_or_default(&self.path).await
  }

  async fn save(&self, file: &ProjectsRegistryFile) -> anyhow::Result<()> {
    write_json_atomic(&self.path, file).await
  }

  pub async fn list(&self) -> anyhow::Result<Vec<ProjectRecord>> {
    Ok(self.load().await?.projects)
  }

  pub async fn resolve_by_id(
    &self,
    id: ProjectId,
  ) -> anyhow::Result<Option<ProjectRecord>> {
    Ok(
      self
        .load()
        .await?
        .projects
        .into_iter()
        .find(|p| p.id == id),
    )
  }

  pub async fn resolve_by_name(
    &self,
    name: &str,
  ) -> anyhow::Result<Option<ProjectRecord>> {
    Ok(
      self
        .load()
        .await?
        .projects
        .into_iter()
        .find(|p| p.name == name),
    )
  }

  pub async fn resolve_by_dir(
    &self,
    project_dir: &Path,
  ) -> anyhow::Result<Option<ProjectRecord>> {
    Ok(
      self
        .load()
        .await?
        .projects
        .into_iter()
        .find(|p| p.project_dir == project_dir),
    )
  }

  /// Registers or refreshes a project by `name`. If `name` already maps
  /// to a different `project_dir`, the existing entry wins and the
  /// caller gets back [`UpsertOutcome::Conflict`].
  pub async fn upsert(
    &self,
    name: &str,
    repo_root: PathBuf,
    project_dir: PathBuf,
  ) -> anyhow::Result<UpsertOutcome> {
    StringValidator::default()
      .min_length(1)
      .max_length(128)
      .matches(StringValidatorMatches::Slug)
      .validate(name)?;

    let mut file = self.load().await?;
    let now = now_ms();

    if let Some(existing) =
      file.projects.iter_mut().find(|p| p.name == name)
    {
      if existing.project_dir != project_dir {
        return Ok(UpsertOutcome::Conflict {
          project: existing.clone(),
        });
      }
      existing.repo_root = repo_root;
      existing.last_seen_at = now;
      let project = existing.clone();
      self.save(&file).await?;
      return Ok(UpsertOutcome::Updated { project });
    }

    let project = ProjectRecord {
      id: ProjectId::new(),
      name: name.to_string(),
      repo_root,
      project_dir,
      created_at: now,
      last_seen_at: now,
    };
    file.projects.push(project.clone());
    self.save(&file).await?;
    Ok(UpsertOutcome::Inserted { project })
  }

  pub async fn remove(&self, id: ProjectId) -> anyhow::Result<bool> {
    let mut file = self.load().await?;
    let before = file.projects.len();
    file.projects.retain(|p| p.id != id);
    let removed = file.projects.len() != before;
    if removed {
      self.save(&file).await?;
    }
    Ok(removed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry() -> (tempfile::TempDir, ProjectRegistry) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("projects.json");
    (dir, ProjectRegistry::new(path))
  }

  #[tokio::test]
  async fn insert_then_update_same_dir() {
    let (_dir, reg) = registry();
    let outcome = reg
      .upsert("demo", "/repo".into(), "/repo/.hack".into())
      .await
      .unwrap();
    assert!(matches!(outcome, UpsertOutcome::Inserted { .. }));

    let outcome = reg
      .upsert("demo", "/repo".into(), "/repo/.hack".into())
      .await
      .unwrap();
    assert!(matches!(outcome, UpsertOutcome::Updated { .. }));

    assert_eq!(reg.list().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn name_reused_for_different_dir_is_a_conflict() {
    let (_dir, reg) = registry();
    reg
      .upsert("demo", "/repo-a".into(), "/repo-a/.hack".into())
      .await
      .unwrap();
    let outcome = reg
      .upsert("demo", "/repo-b".into(), "/repo-b/.hack".into())
      .await
      .unwrap();
    match outcome {
      UpsertOutcome::Conflict { project } => {
        assert_eq!(project.project_dir, PathBuf::from("/repo-a/.hack"));
      }
      other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(reg.list().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn rejects_non_slug_names() {
    let (_dir, reg) = registry();
    let err = reg
      .upsert("Not A Slug", "/repo".into(), "/repo/.hack".into())
      .await;
    assert!(err.is_err());
  }

  #[tokio::test]
  async fn remove_deletes_entry() {
    let (_dir, reg) = registry();
    let outcome = reg
      .upsert("demo", "/repo".into(), "/repo/.hack".into())
      .await
      .unwrap();
    let id = match outcome {
      UpsertOutcome::Inserted { project } => project.id,
      _ => unreachable!(),
    };
    assert!(reg.remove(id).await.unwrap());
    assert!(reg.list().await.unwrap().is_empty());
    assert!(!reg.remove(id).await.unwrap());
  }
}
