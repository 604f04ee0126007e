//! The normalized Compose data model (`spec.md` §3). Consumed as
//! read-only by the translator; produced by [`crate::compose`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
  pub name: String,
  /// Absolute, resolved working directory the project was loaded from.
  pub working_dir: std::path::PathBuf,
  pub services: IndexMap<String, Service>,
  pub volumes: IndexMap<String, NamedVolume>,
  pub networks: IndexMap<String, NamedNetwork>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountKind {
  Bind,
  Volume,
  Tmpfs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
  pub kind: MountKind,
  pub source: Option<String>,
  pub target: String,
  pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPolicy {
  Always,
  Missing,
  Never,
  Build,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Healthcheck {
  pub test: Vec<String>,
  pub interval: Option<String>,
  pub timeout: Option<String>,
  pub start_period: Option<String>,
  pub start_interval: Option<String>,
  pub retries: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceLimits {
  pub mem_limit: Option<i64>,
  pub memswap_limit: Option<i64>,
  pub mem_reservation: Option<i64>,
  pub shm_size: Option<i64>,
  pub cpus: Option<f64>,
  pub cpu_shares: Option<i64>,
  pub cpuset: Option<String>,
  pub pids_limit: Option<i64>,
  pub oom_kill_disable: bool,
  pub oom_score_adj: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Logging {
  pub driver: Option<String>,
  pub options: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
  pub host_ip: Option<String>,
  pub published: Option<String>,
  pub target: String,
  pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Service {
  pub name: String,
  pub image: Option<String>,
  pub container_name: Option<String>,
  pub entrypoint: Vec<String>,
  pub command: Vec<String>,
  pub working_dir: Option<String>,
  pub user: Option<String>,
  pub hostname: Option<String>,
  pub domainname: Option<String>,
  pub pull_policy: Option<PullPolicy>,
  pub ipc: Option<String>,
  pub pid: Option<String>,
  pub network_mode: Option<String>,
  pub group_add: Vec<String>,
  pub labels: IndexMap<String, String>,
  pub annotations: IndexMap<String, String>,
  /// Ordered mapping; `None` value means the variable is passed through
  /// from the environment unset (rendered and then skipped).
  pub environment: IndexMap<String, Option<String>>,
  pub env_files: Vec<String>,
  pub env_secrets: IndexMap<String, String>,
  pub dns: Vec<String>,
  pub dns_search: Vec<String>,
  pub dns_opts: Vec<String>,
  pub extra_hosts: IndexMap<String, Vec<String>>,
  pub expose: Vec<String>,
  pub ports: Vec<PortMapping>,
  pub volumes: Vec<Mount>,
  pub tmpfs: Vec<String>,
  pub extra_mounts: Vec<String>,
  pub devices: Vec<String>,
  pub cap_add: Vec<String>,
  pub cap_drop: Vec<String>,
  pub security_opt: Vec<String>,
  pub privileged: bool,
  pub read_only: bool,
  pub resources: ResourceLimits,
  pub stop_signal: Option<String>,
  pub stop_grace_period_secs: Option<u64>,
  pub tty: bool,
  pub stdin_open: bool,
  pub logging: Logging,
  pub healthcheck: Option<Healthcheck>,
  pub init: bool,
  /// Networks this service is attached to, in declared priority order.
  pub networks: Vec<String>,
  pub podman_args: Vec<String>,
  pub container_args: Vec<String>,
  pub restart: Option<String>,
  /// `x-quad-ops-dependencies`: service name -> condition (opaque).
  pub dependencies: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamedVolume {
  pub external: bool,
  pub external_name: Option<String>,
  pub driver: Option<String>,
  pub name: Option<String>,
  pub labels: IndexMap<String, String>,
  pub driver_opts: IndexMap<String, String>,
  pub podman_args: Vec<String>,
}

impl NamedVolume {
  /// The name a reference to this volume should be rewritten to.
  pub fn reference_name(&self, compose_key: &str) -> String {
    if self.external {
      self
        .external_name
        .clone()
        .unwrap_or_else(|| compose_key.to_string())
    } else {
      compose_key.to_string()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IpamPool {
  pub subnet: Option<String>,
  pub gateway: Option<String>,
  pub ip_range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamedNetwork {
  pub external: bool,
  pub external_name: Option<String>,
  pub driver: Option<String>,
  pub name: Option<String>,
  pub labels: IndexMap<String, String>,
  pub driver_opts: IndexMap<String, String>,
  pub ipam_pools: Vec<IpamPool>,
}

impl NamedNetwork {
  pub fn reference_name(&self, compose_key: &str) -> String {
    if self.external {
      self
        .external_name
        .clone()
        .unwrap_or_else(|| compose_key.to_string())
    } else {
      compose_key.to_string()
    }
  }
}

/// Serializable snapshot kept alongside unit state for diagnostics only;
/// not part of the reconcile hot path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectSummary {
  pub name: String,
  pub service_count: usize,
}

impl From<&Project> for ProjectSummary {
  fn from(p: &Project) -> Self {
    ProjectSummary {
      name: p.name.clone(),
      service_count: p.services.len(),
    }
  }
}
