//! Persistent State Store (`spec.md` §3 "Global State (persisted)", §4.3
//! "Persistence"). JSON at a well-known path; loaded once at reconcile
//! start, written once at reconcile end.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryState {
  pub name: String,
  #[serde(default)]
  pub current_commit: Option<String>,
  #[serde(default)]
  pub previous_commit: Option<String>,
  #[serde(default)]
  pub managed_units: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitState {
  pub content_hash: String,
  #[serde(default)]
  pub bind_mount_hashes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalState {
  #[serde(default)]
  pub repositories: BTreeMap<String, RepositoryState>,
  #[serde(default)]
  pub unit_states: BTreeMap<String, UnitState>,
}

impl GlobalState {
  /// Union of every repository's `managed_units`, per §4.5 step 1.
  pub fn all_managed_units(&self) -> std::collections::BTreeSet<String> {
    self
      .repositories
      .values()
      .flat_map(|r| r.managed_units.iter().cloned())
      .collect()
  }

  pub fn repo_mut(&mut self, name: &str) -> &mut RepositoryState {
    self
      .repositories
      .entry(name.to_string())
      .or_insert_with(|| RepositoryState {
        name: name.to_string(),
        ..Default::default()
      })
  }
}

/// Loads state from `path`, or an empty [`GlobalState`] if it does not
/// yet exist (first-ever reconcile).
pub fn load(path: &Path) -> anyhow::Result<GlobalState> {
  if !path.is_file() {
    return Ok(GlobalState::default());
  }
  let contents = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read state file {}", path.display()))?;
  serde_json::from_str(&contents)
    .with_context(|| format!("failed to parse state file {}", path.display()))
}

/// Writes `state` atomically: serialize to a sibling temp file, then
/// rename over the target. State must reflect what is actually on disk
/// even on a partial-failure reconcile (§4.3, §7 propagation policy).
pub fn save(path: &Path, state: &GlobalState) -> anyhow::Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create state directory {}", parent.display()))?;
  }
  let serialized = serde_json::to_string_pretty(state).context("failed to serialize state")?;
  let tmp_path = path.with_extension("json.tmp");
  std::fs::write(&tmp_path, serialized)
    .with_context(|| format!("failed to write temp state file {}", tmp_path.display()))?;
  std::fs::rename(&tmp_path, path)
    .with_context(|| format!("failed to install state file {}", path.display()))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn all_managed_units_is_union_across_repos() {
    let mut state = GlobalState::default();
    state.repo_mut("r1").managed_units = vec!["a.container".into(), "b.volume".into()];
    state.repo_mut("r2").managed_units = vec!["c.container".into()];
    let all = state.all_managed_units();
    assert_eq!(all.len(), 3);
    assert!(all.contains("a.container"));
  }

  #[test]
  fn round_trips_through_disk() {
    let dir = std::env::temp_dir().join(format!("quadsync-state-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("state.json");

    let mut state = GlobalState::default();
    state.repo_mut("r1").current_commit = Some("abc123".into());
    save(&path, &state).unwrap();

    let loaded = load(&path).unwrap();
    assert_eq!(loaded, state);

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn missing_file_loads_as_empty_state() {
    let path = std::env::temp_dir().join("quadsync-state-does-not-exist.json");
    let loaded = load(&path).unwrap();
    assert_eq!(loaded, GlobalState::default());
  }
}
