//! Network artifact rendering (`spec.md` §4.1 "Network artifact").

use crate::model::{NamedNetwork, Project};

use super::unit::{Section, UnitFile};

pub fn render(project: &Project, key: &str, net: &NamedNetwork) -> Option<UnitFile> {
  if net.external {
    return None;
  }

  let mut unit = UnitFile::new(format!("{}-{key}.network", project.name));
  let mut section = Section::new("Network");

  section.scalar_opt("Driver", net.driver.clone());
  section.scalar_opt("NetworkName", net.name.clone());
  for (k, v) in &net.labels {
    section.dotted("Label", k, v);
  }

  let internal = net.driver_opts.get("internal").map(String::as_str) == Some("true");
  section.bool_flag("Internal", internal);
  let ipv6 = net.driver_opts.get("ipv6").map(String::as_str) == Some("true");
  section.bool_flag("IPv6", ipv6);

  for (opt_key, value) in &net.driver_opts {
    match opt_key.as_str() {
      "disable_dns" if value == "true" => section.scalar("DisableDNS", "true"),
      "dns" => section.repeat("DNS", value),
      "gateway" => section.scalar("Gateway", value),
      "interface_name" => section.scalar("InterfaceName", value),
      "ipam_driver" => section.scalar("IPAMDriver", value),
      "subnet" => section.scalar("Subnet", value),
      "ip_range" => section.repeat("IPRange", value),
      "options" | "opt" => section.scalar("Options", value),
      "module" | "containers-conf-module" => section.scalar("ContainersConfModule", value),
      "network_delete_on_stop" if value == "true" => section.scalar("NetworkDeleteOnStop", "true"),
      "internal" | "ipv6" => {}
      _ => {}
    }
  }

  for (i, pool) in net.ipam_pools.iter().enumerate() {
    if let Some(subnet) = &pool.subnet {
      section.dotted("Subnet", &i.to_string(), subnet);
    }
    if let Some(gw) = &pool.gateway {
      section.dotted("Gateway", &i.to_string(), gw);
    }
    if let Some(range) = &pool.ip_range {
      section.dotted("IPRange", &i.to_string(), range);
    }
  }

  unit.push_section(section);
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
  fn external_network_emits_no_artifact() {
    let project = project();
    let mut net = NamedNetwork::default();
    net.external = true;
    assert!(render(&project, "proxy", &net).is_none());
  }

  #[test]
  fn ipam_pools_render_as_positional_dot_indexed_keys() {
    let project = project();
    let mut net = NamedNetwork::default();
    net.ipam_pools.push(crate::model::IpamPool {
      subnet: Some("10.0.0.0/24".into()),
      gateway: Some("10.0.0.1".into()),
      ip_range: None,
    });
    let unit = render(&project, "default", &net).unwrap();
    let rendered = String::from_utf8(unit.render()).unwrap();
    assert!(rendered.contains("Subnet.0=10.0.0.0/24"));
    assert!(rendered.contains("Gateway.0=10.0.0.1"));
  }

  #[test]
  fn internal_flag_from_driver_opts() {
    let project = project();
    let mut net = NamedNetwork::default();
    net.driver_opts.insert("internal".into(), "true".into());
    let unit = render(&project, "default", &net).unwrap();
    let rendered = String::from_utf8(unit.render()).unwrap();
    assert!(rendered.contains("Internal=true"));
  }
}
