//! Container artifact rendering (`spec.md` §4.1 "Container artifact" and
//! the authoritative field-mapping list directly below it).

use std::path::Path;

use crate::model::{MountKind, Project, PullPolicy, Service};

use super::unit::{Section, UnitFile};

pub fn render(project: &Project, service: &Service, running_as_root: bool) -> UnitFile {
  let container_name = service
    .container_name
    .clone()
    .unwrap_or_else(|| format!("{}-{}", project.name, service.name));

  let mut unit = UnitFile::new(format!("{}-{}.container", project.name, service.name));

  let mut container = Section::new("Container");
  container.scalar_opt("Image", service.image.clone());
  container.scalar("ContainerName", container_name);

  if !service.entrypoint.is_empty() {
    container.scalar("Entrypoint", service.entrypoint.join(" "));
  }
  if !service.command.is_empty() {
    container.scalar("Exec", service.command.join(" "));
  }

  container.scalar_opt("WorkingDir", service.working_dir.clone());
  container.scalar_opt("User", service.user.clone());
  container.scalar_opt("Hostname", service.hostname.clone());
  container.scalar_opt("DomainName", service.domainname.clone());
  container.scalar_opt(
    "PullPolicy",
    service.pull_policy.map(pull_policy_str),
  );
  container.scalar_opt("Ipc", service.ipc.clone());
  container.scalar_opt("Pid", service.pid.clone());
  container.scalar_opt("NetworkMode", service.network_mode.clone());

  container.repeat_many("Group", service.group_add.clone());

  for (k, v) in &service.labels {
    container.dotted("Label", k, v);
  }
  container.repeat_many(
    "Annotation",
    service.annotations.iter().map(|(k, v)| format!("{k}={v}")),
  );

  for (k, v) in &service.environment {
    if let Some(v) = v {
      container.repeat("Environment", format!("{k}={v}"));
    }
  }
  container.repeat_many("EnvironmentFile", service.env_files.clone());
  container.repeat_many(
    "Secret",
    service
      .env_secrets
      .iter()
      .map(|(secret, target)| format!("{secret},type=env,target={target}")),
  );

  container.repeat_many("DNS", service.dns.clone());
  container.repeat_many("DNSSearch", service.dns_search.clone());
  container.repeat_many("DNSOption", service.dns_opts.clone());

  for (host, ips) in &service.extra_hosts {
    for ip in ips {
      container.repeat("AddHost", format!("{host}:{ip}"));
    }
  }

  container.repeat_many("ExposeHostPort", service.expose.clone());

  for port in &service.ports {
    container.repeat("PublishPort", format_port(port));
  }

  for mount in &service.volumes {
    container.repeat("Volume", rewrite_mount(project, mount));
  }
  container.repeat_many("Tmpfs", service.tmpfs.clone());
  container.repeat_many("Mount", service.extra_mounts.clone());

  container.repeat_many(
    "AddDevice",
    service.devices.iter().map(|d| format_device(d)),
  );

  container.repeat_many("AddCapability", service.cap_add.clone());
  container.repeat_many("DropCapability", service.cap_drop.clone());

  let mut podman_args = service.podman_args.clone();
  podman_args.extend(service.container_args.clone());
  apply_security_opts(&service.security_opt, &mut container, &mut podman_args);
  if service.privileged {
    podman_args.push("--privileged".to_string());
  }

  container.bool_flag("ReadOnly", service.read_only);

  let res = &service.resources;
  container.scalar_opt("ShmSize", res.shm_size.map(|v| v.to_string()));
  container.scalar_opt("Memory", res.mem_limit.map(|v| v.to_string()));
  container.scalar_opt("MemorySwap", res.memswap_limit.map(|v| v.to_string()));
  container.scalar_opt(
    "MemoryReservation",
    res.mem_reservation.map(|v| v.to_string()),
  );
  container.scalar_opt("Cpus", res.cpus.map(format_cpus));
  container.scalar_opt("CpuWeight", res.cpu_shares.map(|v| v.to_string()));
  container.scalar_opt("CpuSet", res.cpuset.clone());
  // oom_score_adj wins over oom_kill_disable when both are set (§9).
  if let Some(adj) = res.oom_score_adj {
    container.scalar("OomScoreAdj", adj.to_string());
  } else if res.oom_kill_disable {
    container.scalar("OomScoreAdj", "-999");
  }
  container.scalar_opt("PidsLimit", res.pids_limit.map(|v| v.to_string()));

  container.scalar_opt("StopSignal", service.stop_signal.clone());
  container.scalar_opt(
    "StopTimeout",
    service.stop_grace_period_secs.map(|v| v.to_string()),
  );

  container.bool_flag("Tty", service.tty);
  container.bool_flag("Interactive", service.stdin_open);

  if let Some(hc) = &service.healthcheck {
    if !hc.test.is_empty() {
      container.scalar("HealthCmd", hc.test.join(" "));
    }
    container.scalar_opt("HealthInterval", hc.interval.clone());
    container.scalar_opt("HealthTimeout", hc.timeout.clone());
    container.scalar_opt("HealthStartPeriod", hc.start_period.clone());
    container.scalar_opt("HealthStartupInterval", hc.start_interval.clone());
    container.scalar_opt("HealthRetries", hc.retries.map(|v| v.to_string()));
  }

  container.bool_flag("RunInit", service.init);

  container.scalar_opt("LogDriver", service.logging.driver.clone());
  for (k, v) in &service.logging.options {
    container.dotted("LogOpt", k, v);
  }

  render_networks(project, service, &mut container);

  container.repeat_many("PodmanArgs", podman_args);

  unit.push_section(container);

  let mut svc = Section::new("Service");
  if let Some(restart) = normalize_restart(service.restart.as_deref()) {
    svc.scalar("Restart", restart);
  }
  unit.push_section(svc);

  let mut unit_section = Section::new("Unit");
  for dep in service.dependencies.keys() {
    let target = format!("{}-{}.service", project.name, dep);
    unit_section.repeat("Requires", target.clone());
    unit_section.repeat("After", target);
  }
  unit.push_section(unit_section);

  let mut install = Section::new("Install");
  install.scalar(
    "WantedBy",
    if running_as_root { "multi-user.target" } else { "default.target" },
  );
  unit.push_section(install);

  unit
}

/// Mimics `%g` formatting: shortest decimal representation, no trailing
/// zeros, integral values rendered without a fractional part.
fn format_cpus(v: f64) -> String {
  if v.fract() == 0.0 {
    format!("{}", v as i64)
  } else {
    let s = format!("{v}");
    s
  }
}

fn pull_policy_str(p: PullPolicy) -> &'static str {
  match p {
    PullPolicy::Always => "always",
    PullPolicy::Missing => "missing",
    PullPolicy::Never => "never",
    PullPolicy::Build => "build",
  }
}

fn format_port(p: &crate::model::PortMapping) -> String {
  let target_part = match &p.published {
    Some(published) => format!("{published}:{}", p.target),
    None => p.target.clone(),
  };
  let with_proto = if p.protocol.is_empty() || p.protocol == "tcp" {
    target_part
  } else {
    format!("{target_part}/{}", p.protocol)
  };
  match &p.host_ip {
    Some(ip) if !ip.is_empty() => format!("{ip}:{with_proto}"),
    _ => with_proto,
  }
}

fn format_device(raw: &str) -> String {
  // host:container[:perms], empty fields elided.
  let parts: Vec<&str> = raw.split(':').filter(|s| !s.is_empty()).collect();
  parts.join(":")
}

fn rewrite_mount(project: &Project, mount: &crate::model::Mount) -> String {
  let suffix = if mount.read_only { ":ro" } else { "" };
  match mount.kind {
    MountKind::Volume => {
      let source = mount.source.as_deref().unwrap_or("");
      if source.is_empty() {
        return format!("{}{suffix}", mount.target);
      }
      let rewritten = match project.volumes.get(source) {
        Some(vol) => vol.reference_name(source),
        None => format!("{}-{source}.volume", project.name),
      };
      format!("{rewritten}:{}{suffix}", mount.target)
    }
    MountKind::Bind => {
      let source = mount.source.as_deref().unwrap_or("");
      let abs = absolutize(project, source);
      format!("{abs}:{}{suffix}", mount.target)
    }
    MountKind::Tmpfs => mount.target.clone(),
  }
}

fn absolutize(project: &Project, source: &str) -> String {
  let path = Path::new(source);
  if path.is_absolute() {
    source.to_string()
  } else {
    project.working_dir.join(path).to_string_lossy().into_owned()
  }
}

fn apply_security_opts(opts: &[String], container: &mut Section, podman_args: &mut Vec<String>) {
  for opt in opts {
    if opt == "no-new-privileges" || opt == "no-new-privileges:true" || opt == "no-new-privileges=true" {
      container.scalar("NoNewPrivileges", "true");
      continue;
    }
    if let Some(rest) = opt.strip_prefix("label=") {
      match rest {
        "disable" => container.scalar("SecurityLabelDisable", "true"),
        "nested" => container.scalar("SecurityLabelNested", "true"),
        other => {
          if let Some(v) = other.strip_prefix("type:") {
            container.scalar("SecurityLabelType", v);
          } else if let Some(v) = other.strip_prefix("level:") {
            container.scalar("SecurityLabelLevel", v);
          } else if let Some(v) = other.strip_prefix("filetype:") {
            container.scalar("SecurityLabelFileType", v);
          }
        }
      }
      continue;
    }
    if let Some(v) = opt.strip_prefix("apparmor=") {
      container.scalar("AppArmor", v);
      continue;
    }
    if let Some(v) = opt.strip_prefix("seccomp=") {
      container.scalar("SeccompProfile", v);
      continue;
    }
    if let Some(v) = opt.strip_prefix("mask=") {
      container.repeat("Mask", v);
      continue;
    }
    if let Some(v) = opt.strip_prefix("unmask=") {
      container.repeat("Unmask", v);
      continue;
    }
    // Unknown security_opt tokens are passed through as raw engine args.
    podman_args.push(format!("--security-opt={opt}"));
  }
}

fn render_networks(project: &Project, service: &Service, container: &mut Section) {
  if let Some(mode) = &service.network_mode {
    // NetworkMode already scalar-emitted above; no per-attachment entries.
    let _ = mode;
    return;
  }
  for net_key in &service.networks {
    let rewritten = match project.networks.get(net_key) {
      Some(net) => net.reference_name(net_key),
      None => format!("{}-{net_key}.network", project.name),
    };
    container.repeat("Network", rewritten);
  }
}

fn normalize_restart(restart: Option<&str>) -> Option<&'static str> {
  match restart {
    Some("no") => Some("no"),
    Some("always") => Some("always"),
    Some("on-failure") => Some("on-failure"),
    Some("unless-stopped") => Some("always"),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::*;

  fn empty_project() -> Project {
    Project {
      name: "proj".into(),
      working_dir: "/srv/proj".into(),
      services: IndexMap::new(),
      volumes: IndexMap::new(),
      networks: IndexMap::new(),
    }
  }

  use indexmap::IndexMap;

  #[test]
  fn renders_image_and_container_name() {
    let project = empty_project();
    let mut svc = Service::default();
    svc.name = "web".into();
    svc.image = Some("nginx:latest".into());
    let rendered = String::from_utf8(render(&project, &svc, false).render()).unwrap();
    assert!(rendered.contains("Image=nginx:latest"));
    assert!(rendered.contains("ContainerName=proj-web"));
    assert!(rendered.contains("WantedBy=default.target"));
  }

  #[test]
  fn unless_stopped_maps_to_always() {
    let project = empty_project();
    let mut svc = Service::default();
    svc.name = "web".into();
    svc.restart = Some("unless-stopped".into());
    let rendered = String::from_utf8(render(&project, &svc, false).render()).unwrap();
    assert!(rendered.contains("[Service]\nRestart=always\n"));
  }

  #[test]
  fn dependencies_emit_requires_and_after() {
    let project = empty_project();
    let mut svc = Service::default();
    svc.name = "webapp".into();
    svc.dependencies.insert("db".into(), "service_started".into());
    let rendered = String::from_utf8(render(&project, &svc, false).render()).unwrap();
    assert!(rendered.contains("Requires=proj-db.service"));
    assert!(rendered.contains("After=proj-db.service"));
  }

  #[test]
  fn oom_score_adj_wins_over_kill_disable() {
    let project = empty_project();
    let mut svc = Service::default();
    svc.name = "web".into();
    svc.resources.oom_kill_disable = true;
    svc.resources.oom_score_adj = Some(42);
    let rendered = String::from_utf8(render(&project, &svc, false).render()).unwrap();
    assert!(rendered.contains("OomScoreAdj=42"));
    assert!(!rendered.contains("OomScoreAdj=-999"));
  }

  #[test]
  fn network_mode_suppresses_per_attachment_entries() {
    let project = empty_project();
    let mut svc = Service::default();
    svc.name = "web".into();
    svc.network_mode = Some("host".into());
    svc.networks = vec!["default".into()];
    let rendered = String::from_utf8(render(&project, &svc, false).render()).unwrap();
    assert!(rendered.contains("NetworkMode=host"));
    assert!(!rendered.contains("Network="));
  }
}
