//! Thin Compose YAML loader (SPEC_FULL.md §3 "Compose YAML loader").
//!
//! `spec.md` §1 names the Compose-file loader as an out-of-scope external
//! collaborator; this module is the minimal, direct `serde`-based
//! implementation needed to drive `validate`/`sync` end to end. It does
//! not implement Compose's interpolation/merge/extends grammar.

use std::path::{Path, PathBuf};

use anyhow::Context;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::model::*;

/// A directory is a Compose project iff it directly contains one of
/// these filenames (SPEC_FULL.md §3 "Repository/project discovery");
/// the project name is the directory's base name.
const PROJECT_FILES: &[&str] = &[
  "compose.yaml",
  "compose.yml",
  "docker-compose.yaml",
  "docker-compose.yml",
];

/// Walks `compose_dir` for Compose projects one level deep, per the
/// discovery rule above.
pub fn discover_projects(compose_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
  let mut found = Vec::new();
  if !compose_dir.is_dir() {
    return Ok(found);
  }
  for entry in walkdir::WalkDir::new(compose_dir)
    .min_depth(0)
    .max_depth(4)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_dir())
  {
    if PROJECT_FILES
      .iter()
      .any(|name| entry.path().join(name).is_file())
    {
      found.push(entry.path().to_path_buf());
    }
  }
  found.sort();
  Ok(found)
}

/// Loads the project rooted at `dir` (a directory found by
/// [`discover_projects`]), plus its merged `override` file if present.
pub fn load_project(dir: &Path) -> anyhow::Result<Project> {
  let primary = PROJECT_FILES
    .iter()
    .map(|name| dir.join(name))
    .find(|p| p.is_file())
    .with_context(|| format!("no compose file found under {}", dir.display()))?;

  let raw = std::fs::read_to_string(&primary)
    .with_context(|| format!("failed to read {}", primary.display()))?;
  let mut file: RawComposeFile = serde_yaml_ng::from_str(&raw)
    .with_context(|| format!("failed to parse {}", primary.display()))?;

  for override_name in ["compose.override.yaml", "compose.override.yml", "docker-compose.override.yml"] {
    let override_path = dir.join(override_name);
    if override_path.is_file() {
      let raw = std::fs::read_to_string(&override_path)
        .with_context(|| format!("failed to read {}", override_path.display()))?;
      let over: RawComposeFile = serde_yaml_ng::from_str(&raw)
        .with_context(|| format!("failed to parse {}", override_path.display()))?;
      file.merge(over);
      break;
    }
  }

  let name = dir
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "project".to_string());

  let working_dir = dir
    .canonicalize()
    .unwrap_or_else(|_| dir.to_path_buf());

  file.into_project(name, working_dir)
}

#[derive(Debug, Default, Deserialize)]
struct RawComposeFile {
  #[serde(default)]
  services: IndexMap<String, RawService>,
  #[serde(default)]
  volumes: IndexMap<String, RawVolume>,
  #[serde(default)]
  networks: IndexMap<String, RawNetwork>,
}

impl RawComposeFile {
  fn merge(&mut self, other: RawComposeFile) {
    for (k, v) in other.services {
      self.services.insert(k, v);
    }
    for (k, v) in other.volumes {
      self.volumes.insert(k, v);
    }
    for (k, v) in other.networks {
      self.networks.insert(k, v);
    }
  }

  fn into_project(self, name: String, working_dir: PathBuf) -> anyhow::Result<Project> {
    let mut volumes = IndexMap::new();
    for (key, raw) in self.volumes {
      volumes.insert(key, raw.into_model());
    }
    let mut networks = IndexMap::new();
    for (key, raw) in self.networks {
      networks.insert(key, raw.into_model());
    }
    let mut services = IndexMap::new();
    for (key, raw) in self.services {
      services.insert(key.clone(), raw.into_model(key));
    }
    Ok(Project {
      name,
      working_dir,
      services,
      volumes,
      networks,
    })
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
  One(String),
  Many(Vec<String>),
}

impl StringOrList {
  fn into_vec(self) -> Vec<String> {
    match self {
      StringOrList::One(s) => vec![s],
      StringOrList::Many(v) => v,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
  Str(String),
  Num(serde_yaml_ng::Number),
  Bool(bool),
}

impl Scalar {
  fn into_string(self) -> String {
    match self {
      Scalar::Str(s) => s,
      Scalar::Num(n) => n.to_string(),
      Scalar::Bool(b) => b.to_string(),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListOrMap {
  List(Vec<String>),
  Map(IndexMap<String, Option<Scalar>>),
}

impl ListOrMap {
  fn into_label_map(self) -> IndexMap<String, String> {
    match self {
      ListOrMap::List(items) => items
        .into_iter()
        .filter_map(|item| item.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect(),
      ListOrMap::Map(map) => map
        .into_iter()
        .map(|(k, v)| (k, v.map(Scalar::into_string).unwrap_or_default()))
        .collect(),
    }
  }

  fn into_env_map(self) -> IndexMap<String, Option<String>> {
    match self {
      ListOrMap::List(items) => items
        .into_iter()
        .map(|item| match item.split_once('=') {
          Some((k, v)) => (k.to_string(), Some(v.to_string())),
          None => (item, None),
        })
        .collect(),
      ListOrMap::Map(map) => map
        .into_iter()
        .map(|(k, v)| (k, v.map(Scalar::into_string)))
        .collect(),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependsOn {
  List(Vec<String>),
  Map(IndexMap<String, DependsOnCondition>),
}

#[derive(Debug, Deserialize)]
struct DependsOnCondition {
  #[serde(default = "default_condition")]
  condition: String,
}

fn default_condition() -> String {
  "service_started".to_string()
}

impl DependsOn {
  fn into_map(self) -> IndexMap<String, String> {
    match self {
      DependsOn::List(names) => names
        .into_iter()
        .map(|n| (n, default_condition()))
        .collect(),
      DependsOn::Map(map) => map.into_iter().map(|(k, v)| (k, v.condition)).collect(),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPort {
  Short(String),
  Long {
    target: PortTarget,
    #[serde(default)]
    published: Option<PortTarget>,
    #[serde(default)]
    host_ip: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
  },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortTarget {
  Num(u32),
  Str(String),
}

impl PortTarget {
  fn into_string(self) -> String {
    match self {
      PortTarget::Num(n) => n.to_string(),
      PortTarget::Str(s) => s,
    }
  }
}

impl RawPort {
  fn into_model(self) -> PortMapping {
    match self {
      RawPort::Short(spec) => parse_short_port(&spec),
      RawPort::Long {
        target,
        published,
        host_ip,
        protocol,
      } => PortMapping {
        host_ip,
        published: published.map(PortTarget::into_string),
        target: target.into_string(),
        protocol: protocol.unwrap_or_else(|| "tcp".to_string()),
      },
    }
  }
}

fn parse_short_port(spec: &str) -> PortMapping {
  let (rest, protocol) = match spec.rsplit_once('/') {
    Some((rest, proto)) => (rest, proto.to_string()),
    None => (spec, "tcp".to_string()),
  };
  let parts: Vec<&str> = rest.rsplitn(3, ':').collect();
  // rsplitn gives reverse order: [target, published?, host_ip?]
  let mut parts = parts;
  parts.reverse();
  match parts.as_slice() {
    [target] => PortMapping {
      host_ip: None,
      published: None,
      target: target.to_string(),
      protocol,
    },
    [published, target] => PortMapping {
      host_ip: None,
      published: Some(published.to_string()),
      target: target.to_string(),
      protocol,
    },
    [host_ip, published, target] => PortMapping {
      host_ip: Some(host_ip.to_string()),
      published: Some(published.to_string()),
      target: target.to_string(),
      protocol,
    },
    _ => PortMapping {
      host_ip: None,
      published: None,
      target: rest.to_string(),
      protocol,
    },
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMount {
  Short(String),
  Long {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    source: Option<String>,
    target: String,
    #[serde(default)]
    read_only: bool,
  },
}

impl RawMount {
  fn into_model(self) -> Mount {
    match self {
      RawMount::Short(spec) => parse_short_mount(&spec),
      RawMount::Long {
        kind,
        source,
        target,
        read_only,
      } => Mount {
        kind: match kind.as_str() {
          "bind" => MountKind::Bind,
          "tmpfs" => MountKind::Tmpfs,
          _ => MountKind::Volume,
        },
        source,
        target,
        read_only,
      },
    }
  }
}

fn parse_short_mount(spec: &str) -> Mount {
  let parts: Vec<&str> = spec.split(':').collect();
  let read_only = parts.last().is_some_and(|p| *p == "ro");
  let core = if read_only { &parts[..parts.len() - 1] } else { &parts[..] };
  match core {
    [target] => Mount {
      kind: MountKind::Volume,
      source: None,
      target: target.to_string(),
      read_only,
    },
    [source, target] => Mount {
      kind: if source.starts_with('.') || source.starts_with('/') || source.starts_with('~') {
        MountKind::Bind
      } else {
        MountKind::Volume
      },
      source: Some(source.to_string()),
      target: target.to_string(),
      read_only,
    },
    _ => Mount {
      kind: MountKind::Volume,
      source: None,
      target: spec.to_string(),
      read_only,
    },
  }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNetworks {
  List(Vec<String>),
  Map(IndexMap<String, serde_yaml_ng::Value>),
}

impl RawNetworks {
  fn into_vec(self) -> Vec<String> {
    match self {
      RawNetworks::List(v) => v,
      RawNetworks::Map(m) => m.into_keys().collect(),
    }
  }
}

#[derive(Debug, Default, Deserialize)]
struct RawHealthcheck {
  #[serde(default)]
  test: Option<StringOrList>,
  #[serde(default)]
  interval: Option<String>,
  #[serde(default)]
  timeout: Option<String>,
  #[serde(default)]
  start_period: Option<String>,
  #[serde(default)]
  start_interval: Option<String>,
  #[serde(default)]
  retries: Option<u32>,
}

impl RawHealthcheck {
  fn into_model(self) -> Healthcheck {
    Healthcheck {
      test: self.test.map(StringOrList::into_vec).unwrap_or_default(),
      interval: self.interval,
      timeout: self.timeout,
      start_period: self.start_period,
      start_interval: self.start_interval,
      retries: self.retries,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
struct RawLogging {
  #[serde(default)]
  driver: Option<String>,
  #[serde(default)]
  options: IndexMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawService {
  #[serde(default)]
  image: Option<String>,
  #[serde(default)]
  container_name: Option<String>,
  #[serde(default)]
  entrypoint: Option<StringOrList>,
  #[serde(default)]
  command: Option<StringOrList>,
  #[serde(default)]
  working_dir: Option<String>,
  #[serde(default)]
  user: Option<String>,
  #[serde(default)]
  hostname: Option<String>,
  #[serde(default)]
  domainname: Option<String>,
  #[serde(default)]
  pull_policy: Option<String>,
  #[serde(default)]
  ipc: Option<String>,
  #[serde(default)]
  pid: Option<String>,
  #[serde(default)]
  network_mode: Option<String>,
  #[serde(default)]
  group_add: Vec<String>,
  #[serde(default)]
  labels: Option<ListOrMap>,
  #[serde(default, rename = "x-quad-ops-annotations")]
  annotations: Option<ListOrMap>,
  #[serde(default)]
  environment: Option<ListOrMap>,
  #[serde(default)]
  env_file: Option<StringOrList>,
  #[serde(default, rename = "x-quad-ops-env-secrets")]
  env_secrets: IndexMap<String, String>,
  #[serde(default)]
  dns: Option<StringOrList>,
  #[serde(default)]
  dns_search: Option<StringOrList>,
  #[serde(default)]
  dns_opt: Vec<String>,
  #[serde(default)]
  extra_hosts: Option<ListOrMap>,
  #[serde(default)]
  expose: Vec<String>,
  #[serde(default)]
  ports: Vec<RawPort>,
  #[serde(default)]
  volumes: Vec<RawMount>,
  #[serde(default)]
  tmpfs: Option<StringOrList>,
  #[serde(default, rename = "x-quad-ops-mounts")]
  extra_mounts: Vec<String>,
  #[serde(default)]
  devices: Vec<String>,
  #[serde(default)]
  cap_add: Vec<String>,
  #[serde(default)]
  cap_drop: Vec<String>,
  #[serde(default)]
  security_opt: Vec<String>,
  #[serde(default)]
  privileged: bool,
  #[serde(default)]
  read_only: bool,
  #[serde(default)]
  shm_size: Option<i64>,
  #[serde(default)]
  mem_limit: Option<i64>,
  #[serde(default)]
  memswap_limit: Option<i64>,
  #[serde(default)]
  mem_reservation: Option<i64>,
  #[serde(default)]
  cpus: Option<f64>,
  #[serde(default)]
  cpu_shares: Option<i64>,
  #[serde(default)]
  cpuset: Option<String>,
  #[serde(default)]
  pids_limit: Option<i64>,
  #[serde(default)]
  oom_kill_disable: bool,
  #[serde(default)]
  oom_score_adj: Option<i64>,
  #[serde(default)]
  stop_signal: Option<String>,
  #[serde(default)]
  stop_grace_period: Option<String>,
  #[serde(default)]
  tty: bool,
  #[serde(default)]
  stdin_open: bool,
  #[serde(default)]
  logging: Option<RawLogging>,
  #[serde(default)]
  healthcheck: Option<RawHealthcheck>,
  #[serde(default)]
  init: bool,
  #[serde(default)]
  networks: Option<RawNetworks>,
  #[serde(default, rename = "x-quad-ops-podman-args")]
  podman_args: Vec<String>,
  #[serde(default, rename = "x-quad-ops-container-args")]
  container_args: Vec<String>,
  #[serde(default)]
  restart: Option<String>,
  #[serde(default)]
  depends_on: Option<DependsOn>,
  #[serde(default, rename = "x-quad-ops-dependencies")]
  dependencies_ext: IndexMap<String, String>,
}

impl RawService {
  fn into_model(self, name: String) -> Service {
    let mut dependencies = self
      .depends_on
      .map(DependsOn::into_map)
      .unwrap_or_default();
    for (k, v) in self.dependencies_ext {
      dependencies.insert(k, v);
    }

    Service {
      name,
      image: self.image,
      container_name: self.container_name,
      entrypoint: self.entrypoint.map(StringOrList::into_vec).unwrap_or_default(),
      command: self.command.map(StringOrList::into_vec).unwrap_or_default(),
      working_dir: self.working_dir,
      user: self.user,
      hostname: self.hostname,
      domainname: self.domainname,
      pull_policy: self.pull_policy.as_deref().map(parse_pull_policy),
      ipc: self.ipc,
      pid: self.pid,
      network_mode: self.network_mode,
      group_add: self.group_add,
      labels: self.labels.map(ListOrMap::into_label_map).unwrap_or_default(),
      annotations: self.annotations.map(ListOrMap::into_label_map).unwrap_or_default(),
      environment: self.environment.map(ListOrMap::into_env_map).unwrap_or_default(),
      env_files: self.env_file.map(StringOrList::into_vec).unwrap_or_default(),
      env_secrets: self.env_secrets,
      dns: self.dns.map(StringOrList::into_vec).unwrap_or_default(),
      dns_search: self.dns_search.map(StringOrList::into_vec).unwrap_or_default(),
      dns_opts: self.dns_opt,
      extra_hosts: parse_extra_hosts(self.extra_hosts),
      expose: self.expose,
      ports: self.ports.into_iter().map(RawPort::into_model).collect(),
      volumes: self.volumes.into_iter().map(RawMount::into_model).collect(),
      tmpfs: self.tmpfs.map(StringOrList::into_vec).unwrap_or_default(),
      extra_mounts: self.extra_mounts,
      devices: self.devices,
      cap_add: self.cap_add,
      cap_drop: self.cap_drop,
      security_opt: self.security_opt,
      privileged: self.privileged,
      read_only: self.read_only,
      resources: ResourceLimits {
        mem_limit: self.mem_limit,
        memswap_limit: self.memswap_limit,
        mem_reservation: self.mem_reservation,
        shm_size: self.shm_size,
        cpus: self.cpus,
        cpu_shares: self.cpu_shares,
        cpuset: self.cpuset,
        pids_limit: self.pids_limit,
        oom_kill_disable: self.oom_kill_disable,
        oom_score_adj: self.oom_score_adj,
      },
      stop_signal: self.stop_signal,
      stop_grace_period_secs: self.stop_grace_period.as_deref().map(parse_duration_secs),
      tty: self.tty,
      stdin_open: self.stdin_open,
      logging: self
        .logging
        .map(|l| Logging {
          driver: l.driver,
          options: l.options,
        })
        .unwrap_or_default(),
      healthcheck: self.healthcheck.map(RawHealthcheck::into_model),
      init: self.init,
      networks: self.networks.map(RawNetworks::into_vec).unwrap_or_default(),
      podman_args: self.podman_args,
      container_args: self.container_args,
      restart: self.restart,
      dependencies,
    }
  }
}

fn parse_pull_policy(s: &str) -> PullPolicy {
  match s {
    "always" => PullPolicy::Always,
    "never" => PullPolicy::Never,
    "build" => PullPolicy::Build,
    _ => PullPolicy::Missing,
  }
}

/// Parses a compose duration like `30s`, `1m30s`, `500ms` into seconds.
/// Only whole seconds matter to `StopTimeout`'s rounded-seconds contract.
fn parse_duration_secs(s: &str) -> u64 {
  if let Ok(n) = s.parse::<u64>() {
    return n;
  }
  let mut total = 0u64;
  let mut num = String::new();
  for ch in s.chars() {
    if ch.is_ascii_digit() {
      num.push(ch);
    } else {
      let value: u64 = num.parse().unwrap_or(0);
      num.clear();
      total += match ch {
        'h' => value * 3600,
        'm' => value * 60,
        's' => value,
        _ => 0,
      };
    }
  }
  total
}

fn parse_extra_hosts(raw: Option<ListOrMap>) -> IndexMap<String, Vec<String>> {
  let mut out: IndexMap<String, Vec<String>> = IndexMap::new();
  match raw {
    Some(ListOrMap::List(items)) => {
      for item in items {
        if let Some((host, ip)) = item.split_once(':') {
          out.entry(host.to_string()).or_default().push(ip.to_string());
        }
      }
    }
    Some(ListOrMap::Map(map)) => {
      for (host, value) in map {
        if let Some(v) = value {
          out.entry(host).or_default().push(v.into_string());
        }
      }
    }
    None => {}
  }
  out
}

#[derive(Debug, Default, Deserialize)]
struct RawVolume {
  #[serde(default)]
  external: RawExternal,
  #[serde(default)]
  driver: Option<String>,
  #[serde(default)]
  name: Option<String>,
  #[serde(default)]
  labels: Option<ListOrMap>,
  #[serde(default)]
  driver_opts: IndexMap<String, String>,
  #[serde(default, rename = "x-quad-ops-podman-args")]
  podman_args: Vec<String>,
  #[serde(default, rename = "x-quad-ops-volume-args")]
  volume_args: Vec<String>,
}

impl RawVolume {
  fn into_model(self) -> NamedVolume {
    let mut podman_args = self.podman_args;
    podman_args.extend(self.volume_args);
    NamedVolume {
      external: self.external.flag,
      external_name: self.external.name.or_else(|| self.name.clone()),
      driver: self.driver,
      name: self.name,
      labels: self.labels.map(ListOrMap::into_label_map).unwrap_or_default(),
      driver_opts: self.driver_opts,
      podman_args,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
struct RawNetwork {
  #[serde(default)]
  external: RawExternal,
  #[serde(default)]
  driver: Option<String>,
  #[serde(default)]
  name: Option<String>,
  #[serde(default)]
  labels: Option<ListOrMap>,
  #[serde(default)]
  driver_opts: IndexMap<String, String>,
  #[serde(default)]
  internal: bool,
  #[serde(default)]
  enable_ipv6: bool,
  #[serde(default)]
  ipam: Option<RawIpam>,
}

impl RawNetwork {
  fn into_model(self) -> NamedNetwork {
    let mut driver_opts = self.driver_opts;
    if self.internal {
      driver_opts.insert("internal".into(), "true".into());
    }
    if self.enable_ipv6 {
      driver_opts.insert("ipv6".into(), "true".into());
    }
    NamedNetwork {
      external: self.external.flag,
      external_name: self.external.name.or_else(|| self.name.clone()),
      driver: self.driver,
      name: self.name,
      labels: self.labels.map(ListOrMap::into_label_map).unwrap_or_default(),
      driver_opts,
      ipam_pools: self.ipam.map(RawIpam::into_pools).unwrap_or_default(),
    }
  }
}

#[derive(Debug, Default, Deserialize)]
struct RawIpam {
  #[serde(default)]
  config: Vec<RawIpamPool>,
}

impl RawIpam {
  fn into_pools(self) -> Vec<IpamPool> {
    self
      .config
      .into_iter()
      .map(|p| IpamPool {
        subnet: p.subnet,
        gateway: p.gateway,
        ip_range: p.ip_range,
      })
      .collect()
  }
}

#[derive(Debug, Default, Deserialize)]
struct RawIpamPool {
  #[serde(default)]
  subnet: Option<String>,
  #[serde(default)]
  gateway: Option<String>,
  #[serde(default)]
  ip_range: Option<String>,
}

#[derive(Debug, Default)]
struct RawExternal {
  flag: bool,
  name: Option<String>,
}

// `external:` may appear either as a bare bool or as `{name: ...}`.
impl<'de> serde::de::Deserialize<'de> for RawExternal {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::de::Deserializer<'de>,
  {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
      Bool(bool),
      Map {
        #[serde(default)]
        name: Option<String>,
      },
    }
    Ok(match Repr::deserialize(deserializer)? {
      Repr::Bool(flag) => RawExternal { flag, name: None },
      Repr::Map { name } => RawExternal { flag: true, name },
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_short_port_with_host_ip() {
    let p = parse_short_port("127.0.0.1:8080:80/udp");
    assert_eq!(p.host_ip.as_deref(), Some("127.0.0.1"));
    assert_eq!(p.published.as_deref(), Some("8080"));
    assert_eq!(p.target, "80");
    assert_eq!(p.protocol, "udp");
  }

  #[test]
  fn parses_bare_target_port() {
    let p = parse_short_port("80");
    assert_eq!(p.published, None);
    assert_eq!(p.target, "80");
  }

  #[test]
  fn parses_bind_mount_short_syntax() {
    let m = parse_short_mount("./Caddyfile:/etc/Caddyfile:ro");
    assert_eq!(m.kind, MountKind::Bind);
    assert!(m.read_only);
    assert_eq!(m.target, "/etc/Caddyfile");
  }

  #[test]
  fn parses_named_volume_short_syntax() {
    let m = parse_short_mount("data:/var/lib/data");
    assert_eq!(m.kind, MountKind::Volume);
    assert_eq!(m.source.as_deref(), Some("data"));
  }

  #[test]
  fn parses_compose_duration() {
    assert_eq!(parse_duration_secs("30s"), 30);
    assert_eq!(parse_duration_secs("1m30s"), 90);
    assert_eq!(parse_duration_secs("10"), 10);
  }
}
