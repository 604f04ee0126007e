//! Compose→Unit Translator (`spec.md` §4.1). Pure: no I/O, no engine
//! calls. [`translate_project`] is the entry point invoked per project
//! by the reconciler (`spec.md` §4.5 step 2b).

mod container;
mod network;
mod unit;
mod volume;

pub use unit::{FieldValue, Section, UnitFile};

use graph::DependencyGraph;
use thiserror::Error;

use crate::model::Project;

#[derive(Debug, Error)]
pub enum TranslateError {
  #[error("service dependency cycle in project {project:?}: {}", format_cycle(cycle))]
  Cycle { project: String, cycle: Vec<String> },
  #[error("invalid service dependency declaration in project {project:?}: {source}")]
  InvalidDependency {
    project: String,
    #[source]
    source: graph::GraphError,
  },
}

fn format_cycle(cycle: &[String]) -> String {
  cycle.join(" \u{2192} ")
}

/// Renders every non-external volume, non-external network, and service
/// in `project` into a deterministic, byte-stable list of unit artifacts.
///
/// `running_as_root` selects the `[Install] WantedBy=` target (§4.1).
pub fn translate_project(
  project: &Project,
  running_as_root: bool,
) -> Result<Vec<UnitFile>, TranslateError> {
  let deps = DependencyGraph::new();
  for name in project.services.keys() {
    deps.add_service(name);
  }
  for (name, service) in &project.services {
    for dep in service.dependencies.keys() {
      deps
        .add_dependency(name, dep)
        .map_err(|source| TranslateError::InvalidDependency {
          project: project.name.clone(),
          source,
        })?;
    }
  }
  if let Some(cycle) = deps.find_cycle() {
    return Err(TranslateError::Cycle {
      project: project.name.clone(),
      cycle,
    });
  }

  let mut artifacts = Vec::new();

  let mut volume_keys: Vec<&String> = project.volumes.keys().collect();
  volume_keys.sort();
  for key in volume_keys {
    let vol = &project.volumes[key];
    if let Some(unit) = volume::render(project, key, vol) {
      artifacts.push(unit);
    }
  }

  let mut network_keys: Vec<&String> = project.networks.keys().collect();
  network_keys.sort();
  for key in network_keys {
    let net = &project.networks[key];
    if let Some(unit) = network::render(project, key, net) {
      artifacts.push(unit);
    }
  }

  let mut service_keys: Vec<&String> = project.services.keys().collect();
  service_keys.sort();
  for key in service_keys {
    let service = &project.services[key];
    artifacts.push(container::render(project, service, running_as_root));
  }

  Ok(artifacts)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Service;
  use indexmap::IndexMap;

  fn three_tier_project() -> Project {
    let mut services = IndexMap::new();
    services.insert(
      "db".to_string(),
      Service {
        name: "db".into(),
        image: Some("postgres".into()),
        ..Default::default()
      },
    );
    let mut webapp = Service {
      name: "webapp".into(),
      image: Some("app".into()),
      ..Default::default()
    };
    webapp
      .dependencies
      .insert("db".into(), "service_started".into());
    services.insert("webapp".to_string(), webapp);
    let mut proxy = Service {
      name: "proxy".into(),
      image: Some("caddy".into()),
      ..Default::default()
    };
    proxy
      .dependencies
      .insert("webapp".into(), "service_started".into());
    services.insert("proxy".to_string(), proxy);

    Project {
      name: "proj".into(),
      working_dir: "/srv/proj".into(),
      services,
      volumes: IndexMap::new(),
      networks: IndexMap::new(),
    }
  }

  #[test]
  fn three_tier_project_emits_requires_after_on_proxy() {
    let project = three_tier_project();
    let artifacts = translate_project(&project, false).unwrap();
    let proxy = artifacts
      .iter()
      .find(|u| u.filename == "proj-proxy.container")
      .unwrap();
    let rendered = String::from_utf8(proxy.render()).unwrap();
    assert!(rendered.contains("Requires=proj-webapp.service"));
    assert!(rendered.contains("After=proj-webapp.service"));
  }

  #[test]
  fn cyclic_project_is_rejected_with_witness() {
    let mut services = IndexMap::new();
    let mut a = Service {
      name: "a".into(),
      ..Default::default()
    };
    a.dependencies.insert("c".into(), "service_started".into());
    let mut b = Service {
      name: "b".into(),
      ..Default::default()
    };
    b.dependencies.insert("a".into(), "service_started".into());
    let mut c = Service {
      name: "c".into(),
      ..Default::default()
    };
    c.dependencies.insert("b".into(), "service_started".into());
    services.insert("a".to_string(), a);
    services.insert("b".to_string(), b);
    services.insert("c".to_string(), c);

    let project = Project {
      name: "cyclic".into(),
      working_dir: "/srv/cyclic".into(),
      services,
      volumes: IndexMap::new(),
      networks: IndexMap::new(),
    };

    let err = translate_project(&project, false).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains('a') && msg.contains('b') && msg.contains('c'));
    assert!(msg.contains('\u{2192}'));
  }

  #[test]
  fn render_is_deterministic_across_runs() {
    let project = three_tier_project();
    let first = translate_project(&project, false).unwrap();
    let second = translate_project(&project, false).unwrap();
    let first_bytes: Vec<_> = first.iter().map(|u| u.render()).collect();
    let second_bytes: Vec<_> = second.iter().map(|u| u.render()).collect();
    assert_eq!(first_bytes, second_bytes);
  }
}
