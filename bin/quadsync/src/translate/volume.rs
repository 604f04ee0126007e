//! Volume artifact rendering (`spec.md` §4.1 "Volume artifact").

use crate::model::{NamedVolume, Project};

use super::unit::{Section, UnitFile};

/// `None` when `vol.external` — external volumes are never materialized
/// (§3 invariant 6, §8 property 8).
pub fn render(project: &Project, key: &str, vol: &NamedVolume) -> Option<UnitFile> {
  if vol.external {
    return None;
  }

  let mut unit = UnitFile::new(format!("{}-{key}.volume", project.name));
  let mut section = Section::new("Volume");

  section.scalar_opt("Driver", vol.driver.clone());
  section.scalar_opt("VolumeName", vol.name.clone());
  for (k, v) in &vol.labels {
    section.dotted("Label", k, v);
  }

  for (opt_key, value) in &vol.driver_opts {
    match opt_key.as_str() {
      "copy" if value == "true" => section.scalar("Copy", "true"),
      "device" => section.scalar("Device", value),
      "group" => section.scalar("Group", value),
      "image" => section.scalar("Image", value),
      "options" | "o" => section.scalar("Options", value),
      "type" => section.scalar("Type", value),
      "user" | "uid" => section.scalar("User", value),
      "path" => section.scalar("Path", value),
      "module" | "containers-conf-module" => section.scalar("ContainersConfModule", value),
      // Unknown driver options are dropped, not passed through (§4.1).
      _ => {}
    }
  }

  unit.push_section(section);

  // Legacy dot-indexed shape preserved for volume extra-args (§9 design
  // note: canonical form is repeated `PodmanArgs=`, but volume artifacts
  // historically used dot-indexing and it is kept for byte-stable output).
  if !vol.podman_args.is_empty() {
    let mut global = Section::new("Volume");
    for (i, arg) in vol.podman_args.iter().enumerate() {
      global.dotted("PodmanArgs", &i.to_string(), arg);
    }
    unit.push_section(global);
  }

  Some(unit)
}

#[cfg(test)]
mod tests {
  use super::*;
  use indexmap::IndexMap;

  fn project() -> Project {
    Project {
      name: "proj".into(),
      working_dir: "/srv/proj".into(),
      services: IndexMap::new(),
      volumes: IndexMap::new(),
      networks: IndexMap::new(),
    }
  }

  #[test]
  fn external_volume_emits_no_artifact() {
    let project = project();
    let mut vol = NamedVolume::default();
    vol.external = true;
    assert!(render(&project, "data", &vol).is_none());
  }

  #[test]
  fn unknown_driver_opt_is_dropped() {
    let project = project();
    let mut vol = NamedVolume::default();
    vol.driver_opts.insert("made-up".into(), "x".into());
    let unit = render(&project, "data", &vol).unwrap();
    let rendered = String::from_utf8(unit.render()).unwrap();
    assert!(!rendered.contains("made-up"));
    assert!(!rendered.contains('x'));
  }

  #[test]
  fn known_driver_opts_map_to_documented_keys() {
    let project = project();
    let mut vol = NamedVolume::default();
    vol.driver_opts.insert("type".into(), "nfs".into());
    vol.driver_opts.insert("device".into(), ":/export".into());
    let unit = render(&project, "data", &vol).unwrap();
    let rendered = String::from_utf8(unit.render()).unwrap();
    assert!(rendered.contains("Type=nfs"));
    assert!(rendered.contains("Device=:/export"));
  }
}
