//! The Reconciler and Rollback Path (`spec.md` §4.5, §4.6). Grounded on
//! the teacher's staged-pipeline shape in its compose-write flow: fetch,
//! render, diff, write, converge.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use anyhow::Context;
use command::run_logged_command;
use graph::DependencyGraph;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::secrets;
use crate::state::{self, GlobalState, UnitState};
use crate::svcmgr::{Scope, ServiceManager};
use crate::translate::{self, UnitFile};
use crate::{changes, compose};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Sync,
  Rollback,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
  pub repos_processed: usize,
  pub repos_failed: Vec<String>,
  pub restarted: Vec<String>,
  pub started: Vec<String>,
  pub removed_stale: Vec<String>,
}

impl ReconcileReport {
  pub fn into_result(self) -> anyhow::Result<Self> {
    if self.repos_failed.is_empty() {
      Ok(self)
    } else {
      let first = &self.repos_failed[0];
      Err(anyhow::anyhow!(
        "{} of {} repositories failed to reconcile; first failure: {first}",
        self.repos_failed.len(),
        self.repos_processed,
      ))
    }
  }
}

pub struct Reconciler<'a> {
  pub config: &'a AppConfig,
  pub running_as_root: bool,
  pub container_engine: String,
}

impl<'a> Reconciler<'a> {
  pub fn new(config: &'a AppConfig, running_as_root: bool) -> Self {
    Reconciler {
      config,
      running_as_root,
      container_engine: "podman".to_string(),
    }
  }

  fn repo_root(&self) -> std::path::PathBuf {
    self.config.repository_dir(self.running_as_root)
  }

  fn quadlet_dir(&self) -> std::path::PathBuf {
    self.config.quadlet_dir(self.running_as_root)
  }

  fn state_path(&self) -> std::path::PathBuf {
    self.config.state_path(self.running_as_root)
  }

  fn service_manager(&self) -> ServiceManager {
    ServiceManager::new(
      Scope::Auto,
      self.running_as_root,
      self.config.unit_start_timeout(),
      self.config.image_pull_timeout(),
    )
  }

  /// End-to-end contract for `reconcile(mode)` (§4.5).
  pub async fn reconcile(&self, mode: Mode) -> anyhow::Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    // 1. Load state; snapshot oldManagedUnits.
    let mut state = state::load(&self.state_path()).context("loading state store")?;
    let old_managed = state.all_managed_units();

    let mut new_unit_states: std::collections::BTreeMap<String, UnitState> =
      Default::default();
    let mut images = HashSet::new();
    let mut container_units = Vec::new();
    let mut combined_graph = DependencyGraph::new();

    let quadlet_dir = self.quadlet_dir();
    std::fs::create_dir_all(&quadlet_dir)
      .with_context(|| format!("creating artifact directory {}", quadlet_dir.display()))?;
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let mut perms = std::fs::metadata(&quadlet_dir)?.permissions();
      perms.set_mode(0o755);
      std::fs::set_permissions(&quadlet_dir, perms).ok();
    }

    // 2. Per-repository processing, in declaration order.
    for repo_cfg in &self.config.repositories {
      report.repos_processed += 1;
      match self
        .process_repository(mode, repo_cfg, &mut state, &quadlet_dir, &mut new_unit_states, &mut images, &mut container_units, &combined_graph)
        .await
      {
        Ok(()) => {}
        Err(e) => {
          warn!(repo = %repo_cfg.name, error = %e, "repository reconcile failed");
          report.repos_failed.push(repo_cfg.name.clone());
        }
      }
    }

    // 3. Drop stale repositories no longer in config.
    let configured: BTreeSet<&str> = self.config.repositories.iter().map(|r| r.name.as_str()).collect();
    for (name, repo_state) in state.repositories.iter_mut() {
      if !configured.contains(name.as_str()) {
        repo_state.managed_units.clear();
      }
    }

    // 4a. Finalize: compute stale set and clean it up.
    let new_managed = state.all_managed_units();
    let stale: Vec<String> = old_managed.difference(&new_managed).cloned().collect();
    let manager = self.service_manager();
    for filename in &stale {
      if let Some(service_name) = container_service_name(filename) {
        if let Err(e) = manager.stop(&[service_name.clone()]).await {
          warn!(unit = %service_name, error = %e, "failed to stop stale unit");
        }
        if let Err(e) = manager.disable(&[service_name]).await {
          warn!(file = %filename, error = %e, "failed to disable stale unit");
        }
      }
      let path = quadlet_dir.join(filename);
      if let Err(e) = std::fs::remove_file(&path) {
        warn!(file = %filename, error = %e, "failed to remove stale artifact");
      }
      state.unit_states.remove(filename);
      report.removed_stale.push(filename.clone());
    }

    // 4b. changed = container artifacts whose state differs from stored.
    let mut restart_set = Vec::new();
    for (filename, new_state) in &new_unit_states {
      if !filename.ends_with(".container") {
        continue;
      }
      if changes::is_changed(new_state, state.unit_states.get(filename)) {
        if let Some(service_name) = container_service_name(filename) {
          restart_set.push(service_name);
        }
      }
    }

    // 4c. Update stored unit states.
    for (filename, unit_state) in new_unit_states {
      state.unit_states.insert(filename, unit_state);
    }

    // 4d. Persist state before finalize returns (even on partial failure).
    state::save(&self.state_path(), &state).context("writing state store")?;

    // 4e. Reload the service manager so the generator picks up new units.
    manager.daemon_reload().await.context("daemon-reload")?;

    // 4f. Pull every collected image sequentially before starting.
    for image in sorted(images) {
      let log = run_logged_command(
        "ImagePull",
        None,
        format!("{} pull {image}", self.container_engine),
      )
      .await;
      if !log.success {
        return Err(anyhow::anyhow!("failed to pull image {image}: {}", log.stderr))
          .context("finalize: image pull");
      }
    }

    // Order restart/start by the dependency graph (§5 ordering guarantee).
    let order = combined_graph.topological_order().unwrap_or_default();
    let restart_set: Vec<String> = ordered_by(&order, restart_set);
    let start_set: Vec<String> = ordered_by(
      &order,
      container_units
        .into_iter()
        .filter(|u| !restart_set.contains(u))
        .collect(),
    );

    // 4g. Restart the changed set in dependency order.
    if !restart_set.is_empty() {
      manager.restart(&restart_set).await.context("restarting changed units")?;
    }
    report.restarted = restart_set;

    // 4h. Start everything else (idempotent for already-running units).
    if !start_set.is_empty() {
      manager.start(&start_set).await.context("starting units")?;
    }
    report.started = start_set;

    report.into_result()
  }

  #[allow(clippy::too_many_arguments)]
  async fn process_repository(
    &self,
    mode: Mode,
    repo_cfg: &crate::config::RepositoryConfig,
    state: &mut GlobalState,
    quadlet_dir: &Path,
    new_unit_states: &mut std::collections::BTreeMap<String, UnitState>,
    images: &mut HashSet<String>,
    container_units: &mut Vec<String>,
    combined_graph: &DependencyGraph,
  ) -> anyhow::Result<()> {
    let repo_ref = git::RepoRef {
      name: repo_cfg.name.clone(),
      url: repo_cfg.url.clone(),
      branch: repo_cfg.git_ref.clone().unwrap_or_else(|| "main".to_string()),
      commit: None,
    };
    let repo_dir = repo_ref.path(&self.repo_root());

    let commit = match mode {
      Mode::Sync => {
        let result = git::pull_or_clone(&repo_ref, &self.repo_root(), None)
          .await
          .context("fetching repository")?;
        if !result.success() {
          anyhow::bail!("git fetch failed for repository {}", repo_cfg.name);
        }
        result.hash.context("fetch did not report a commit hash")?
      }
      Mode::Rollback => {
        let previous = state
          .repositories
          .get(&repo_cfg.name)
          .and_then(|r| r.previous_commit.clone());
        let Some(previous) = previous else {
          warn!(repo = %repo_cfg.name, "no previous commit recorded; skipping rollback");
          return Ok(());
        };
        git::checkout_commit(&repo_dir, &previous)
          .await
          .context("checking out previous commit")?;
        previous
      }
    };

    let compose_dir = match &repo_cfg.compose_dir {
      Some(sub) => repo_dir.join(sub),
      None => repo_dir.clone(),
    };
    let project_dirs = compose::discover_projects(&compose_dir).context("discovering projects")?;

    let mut managed_units = Vec::new();
    let available_secrets = secrets::list_available_secrets(&self.container_engine).await;

    for project_dir in project_dirs {
      let project = match compose::load_project(&project_dir) {
        Ok(p) => p,
        Err(e) => {
          warn!(project = %project_dir.display(), error = %e, "failed to load compose project");
          continue;
        }
      };

      let mut project = project;
      for (name, service) in project.services.clone() {
        let missing = secrets::missing_secrets(&service, &available_secrets);
        if !missing.is_empty() {
          warn!(service = %name, missing = ?missing, "dropping service with missing secrets");
          project.services.shift_remove(&name);
        }
      }

      for name in project.services.keys() {
        combined_graph.add_service(&format!("{}-{name}.service", project.name));
      }
      for (name, service) in &project.services {
        for dep in service.dependencies.keys() {
          let _ = combined_graph.add_dependency(
            &format!("{}-{name}.service", project.name),
            &format!("{}-{dep}.service", project.name),
          );
        }
      }

      let artifacts = match translate::translate_project(&project, self.running_as_root) {
        Ok(a) => a,
        Err(e) => {
          warn!(project = %project.name, error = %e, "cycle detected; skipping project");
          continue;
        }
      };

      let container_service_for_filename: std::collections::HashMap<String, &crate::model::Service> = project
        .services
        .iter()
        .map(|(key, service)| (format!("{}-{key}.container", project.name), service))
        .collect();

      for artifact in &artifacts {
        self.write_artifact(quadlet_dir, artifact)?;
        managed_units.push(artifact.filename.clone());

        if let Some(service) = container_service_for_filename.get(&artifact.filename) {
          if let Some(image) = &service.image {
            images.insert(image.clone());
          }
          let service_unit = container_service_name(&artifact.filename).unwrap();
          container_units.push(service_unit);
          let bind_sources = changes::bind_mount_sources(&project, service);
          new_unit_states.insert(
            artifact.filename.clone(),
            changes::compute_unit_state(artifact, &bind_sources),
          );
        }
      }
    }

    let repo_state = state.repo_mut(&repo_cfg.name);
    match mode {
      Mode::Sync => {
        repo_state.previous_commit = repo_state.current_commit.take().or(repo_state.previous_commit.clone());
        repo_state.current_commit = Some(commit);
      }
      Mode::Rollback => {
        let old_current = repo_state.current_commit.clone();
        repo_state.current_commit = Some(commit);
        repo_state.previous_commit = old_current;
      }
    }
    repo_state.managed_units = managed_units;

    Ok(())
  }

  fn write_artifact(&self, quadlet_dir: &Path, artifact: &UnitFile) -> anyhow::Result<()> {
    let path = quadlet_dir.join(&artifact.filename);
    std::fs::write(&path, artifact.render())
      .with_context(|| format!("writing artifact {}", path.display()))?;
    Ok(())
  }
}

fn container_service_name(filename: &str) -> Option<String> {
  filename
    .strip_suffix(".container")
    .map(|base| format!("{base}.service"))
}

fn sorted(set: HashSet<String>) -> Vec<String> {
  let mut v: Vec<String> = set.into_iter().collect();
  v.sort();
  v
}

fn ordered_by(topo: &[String], mut items: Vec<String>) -> Vec<String> {
  items.sort_by_key(|item| topo.iter().position(|t| t == item).unwrap_or(usize::MAX));
  items
}

/// `up`/`down` lifecycle façade (§4.6).
pub async fn up(
  config: &AppConfig,
  running_as_root: bool,
  project_filter: Option<&str>,
  service_filter: &[String],
) -> anyhow::Result<Vec<String>> {
  lifecycle(config, running_as_root, project_filter, service_filter, true).await
}

pub async fn down(
  config: &AppConfig,
  running_as_root: bool,
  project_filter: Option<&str>,
  service_filter: &[String],
) -> anyhow::Result<Vec<String>> {
  lifecycle(config, running_as_root, project_filter, service_filter, false).await
}

async fn lifecycle(
  config: &AppConfig,
  running_as_root: bool,
  project_filter: Option<&str>,
  service_filter: &[String],
  starting: bool,
) -> anyhow::Result<Vec<String>> {
  let reconciler = Reconciler::new(config, running_as_root);
  let repo_root = reconciler.repo_root();
  let available_secrets = secrets::list_available_secrets(&reconciler.container_engine).await;

  let mut graph = DependencyGraph::new();
  let mut service_names = Vec::new();
  let mut images = HashSet::new();

  for repo_cfg in &config.repositories {
    let repo_ref = git::RepoRef {
      name: repo_cfg.name.clone(),
      url: repo_cfg.url.clone(),
      branch: repo_cfg.git_ref.clone().unwrap_or_else(|| "main".to_string()),
      commit: None,
    };
    let repo_dir = repo_ref.path(&repo_root);
    let compose_dir = match &repo_cfg.compose_dir {
      Some(sub) => repo_dir.join(sub),
      None => repo_dir.clone(),
    };
    for project_dir in compose::discover_projects(&compose_dir)? {
      let project = match compose::load_project(&project_dir) {
        Ok(p) => p,
        Err(e) => {
          warn!(project = %project_dir.display(), error = %e, "failed to load compose project");
          continue;
        }
      };
      if let Some(filter) = project_filter {
        if project.name != filter {
          continue;
        }
      }
      for (name, service) in &project.services {
        if !service_filter.is_empty() && !service_filter.contains(name) {
          continue;
        }
        let missing = secrets::missing_secrets(service, &available_secrets);
        if !missing.is_empty() {
          warn!(service = %name, missing = ?missing, "skipping service with missing secrets");
          continue;
        }
        let unit = format!("{}-{name}.service", project.name);
        graph.add_service(&unit);
        for dep in service.dependencies.keys() {
          let dep_unit = format!("{}-{dep}.service", project.name);
          let _ = graph.add_dependency(&unit, &dep_unit);
        }
        service_names.push(unit);
        if starting {
          if let Some(image) = &service.image {
            images.insert(image.clone());
          }
        }
      }
    }
  }

  let manager = reconciler.service_manager();
  if starting {
    for image in sorted(images) {
      let log = run_logged_command(
        "ImagePull",
        None,
        format!("{} pull {image}", reconciler.container_engine),
      )
      .await;
      if !log.success {
        anyhow::bail!("failed to pull image {image}: {}", log.stderr);
      }
    }
  }

  let order = graph.topological_order().unwrap_or_default();
  let mut ordered = ordered_by(&order, service_names);
  if !starting {
    ordered.reverse();
  }

  if starting {
    manager.start(&ordered).await.context("starting services")?;
  } else {
    manager.stop(&ordered).await.context("stopping services")?;
  }

  info!(count = ordered.len(), "lifecycle operation complete");
  Ok(ordered)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn container_service_name_strips_extension() {
    assert_eq!(
      container_service_name("proj-web.container"),
      Some("proj-web.service".to_string())
    );
    assert_eq!(container_service_name("proj-data.volume"), None);
  }

  #[test]
  fn ordered_by_places_earlier_topo_entries_first() {
    let topo = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let items = vec!["c".to_string(), "a".to_string()];
    assert_eq!(ordered_by(&topo, items), vec!["a".to_string(), "c".to_string()]);
  }
}
