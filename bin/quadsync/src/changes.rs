//! Change Detector (`spec.md` §4.3). Hashes rendered artifact bytes plus
//! every in-tree bind-mounted regular file, and diffs the result against
//! the State Store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::model::{MountKind, Project, Service};
use crate::state::UnitState;
use crate::translate::UnitFile;
use crate::validate::is_contained;

fn hex_sha256(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}

/// Absolute sources of every `bind` mount on `service` that resolves
/// under the project's working directory. Paths outside it are ignored
/// entirely (§4.3, §8 property 7).
pub fn bind_mount_sources(project: &Project, service: &Service) -> Vec<PathBuf> {
  service
    .volumes
    .iter()
    .filter(|m| m.kind == MountKind::Bind)
    .filter_map(|m| m.source.as_deref())
    .map(|source| {
      let path = Path::new(source);
      if path.is_absolute() {
        path.to_path_buf()
      } else {
        project.working_dir.join(path)
      }
    })
    .filter(|abs| is_contained(&project.working_dir, abs))
    .collect()
}

/// Computes the unit state for a rendered container artifact: the hash
/// of its bytes plus a hash per bind-mounted regular file that exists
/// and is readable.
pub fn compute_unit_state(artifact: &UnitFile, bind_sources: &[PathBuf]) -> UnitState {
  let content_hash = hex_sha256(&artifact.render());
  let mut bind_mount_hashes = BTreeMap::new();
  for source in bind_sources {
    if let Ok(metadata) = std::fs::metadata(source) {
      if metadata.is_file() {
        if let Ok(bytes) = std::fs::read(source) {
          bind_mount_hashes.insert(source.to_string_lossy().into_owned(), hex_sha256(&bytes));
        }
      }
    }
  }
  UnitState {
    content_hash,
    bind_mount_hashes,
  }
}

/// True iff `new` differs from `old` under §4.3's diff rule: content
/// hash differs, or any bind-mount path appears in only one side, or
/// appears in both with a different hash.
pub fn is_changed(new: &UnitState, old: Option<&UnitState>) -> bool {
  let Some(old) = old else {
    return true;
  };
  if new.content_hash != old.content_hash {
    return true;
  }
  if new.bind_mount_hashes.len() != old.bind_mount_hashes.len() {
    return true;
  }
  for (path, hash) in &new.bind_mount_hashes {
    match old.bind_mount_hashes.get(path) {
      Some(old_hash) if old_hash == hash => {}
      _ => return true,
    }
  }
  false
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Mount;
  use indexmap::IndexMap;

  fn project(dir: &Path) -> Project {
    Project {
      name: "proj".into(),
      working_dir: dir.to_path_buf(),
      services: IndexMap::new(),
      volumes: IndexMap::new(),
      networks: IndexMap::new(),
    }
  }

  #[test]
  fn bind_mounts_outside_project_dir_are_excluded() {
    let dir = PathBuf::from("/srv/proj");
    let project = project(&dir);
    let mut service = Service::default();
    service.volumes.push(Mount {
      kind: MountKind::Bind,
      source: Some("./Caddyfile".into()),
      target: "/etc/Caddyfile".into(),
      read_only: false,
    });
    service.volumes.push(Mount {
      kind: MountKind::Bind,
      source: Some("/etc/passwd".into()),
      target: "/etc/passwd".into(),
      read_only: true,
    });
    let sources = bind_mount_sources(&project, &service);
    assert_eq!(sources, vec![dir.join("Caddyfile")]);
  }

  #[test]
  fn no_previous_state_is_always_changed() {
    let artifact = crate::translate::UnitFile::new("p-web.container");
    let state = compute_unit_state(&artifact, &[]);
    assert!(is_changed(&state, None));
  }

  #[test]
  fn identical_content_and_bind_hashes_is_unchanged() {
    let mut old = UnitState::default();
    old.content_hash = "abc".into();
    old.bind_mount_hashes.insert("/srv/proj/Caddyfile".into(), "111".into());

    let mut new = old.clone();
    assert!(!is_changed(&new, Some(&old)));

    new.bind_mount_hashes.insert("/srv/proj/Caddyfile".into(), "222".into());
    assert!(is_changed(&new, Some(&old)));
  }

  #[test]
  fn added_or_removed_bind_mount_counts_as_changed() {
    let old = UnitState::default();
    let mut new = UnitState::default();
    new.bind_mount_hashes.insert("/srv/proj/new-file".into(), "xyz".into());
    assert!(is_changed(&new, Some(&old)));
  }
}
