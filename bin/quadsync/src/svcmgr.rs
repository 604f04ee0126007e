//! Service-Manager Client (`spec.md` §4.4). Wraps the systemd control
//! bus (`org.freedesktop.systemd1`) over `zbus`. One connection is opened
//! per operation in the baseline design (§5); [`ServiceManager::batch`]
//! amortizes the connect cost for a group of calls.

use std::collections::BTreeMap;
use std::time::Duration;

use command::run_logged_command;
use futures::StreamExt;
use thiserror::Error;
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use crate::validate::{ValidationError, validate_unit_name};

const DESTINATION: &str = "org.freedesktop.systemd1";
const OBJECT_PATH: &str = "/org/freedesktop/systemd1";

#[zbus::proxy(
  interface = "org.freedesktop.systemd1.Manager",
  default_service = "org.freedesktop.systemd1",
  default_path = "/org/freedesktop/systemd1"
)]
trait Manager {
  #[zbus(name = "Reload")]
  async fn reload(&self) -> zbus::Result<()>;

  #[zbus(name = "StartUnit")]
  async fn start_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

  #[zbus(name = "StopUnit")]
  async fn stop_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

  #[zbus(name = "RestartUnit")]
  async fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

  #[zbus(name = "DisableUnitFiles")]
  async fn disable_unit_files(
    &self,
    files: &[&str],
    runtime: bool,
  ) -> zbus::Result<Vec<(String, String, String)>>;

  #[zbus(name = "ResetFailedUnit")]
  async fn reset_failed_unit(&self, name: &str) -> zbus::Result<()>;

  #[zbus(name = "GetUnit")]
  async fn get_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;

  #[zbus(signal, name = "JobRemoved")]
  fn job_removed(&self, id: u32, job: OwnedObjectPath, unit: String, result: String) -> zbus::Result<()>;
}

/// Scope to connect to, per §4.4 "Scope selection".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
  System,
  User,
  Auto,
}

impl Scope {
  fn resolve(self, running_as_root: bool) -> bool {
    match self {
      Scope::System => true,
      Scope::User => false,
      Scope::Auto => running_as_root,
    }
  }
}

#[derive(Debug, Error)]
pub enum ManagerError {
  #[error(transparent)]
  InvalidName(#[from] ValidationError),
  #[error("failed to connect to the service manager bus: {0}")]
  Connect(#[source] zbus::Error),
  #[error("job for unit {unit:?} did not complete: {result}\n{diagnostic}")]
  JobFailed {
    unit: String,
    result: String,
    diagnostic: String,
  },
  #[error("unit {0:?} is not loaded; refusing restart")]
  NotLoaded(String),
  #[error("timed out waiting for unit {0:?} to activate")]
  ActivationTimeout(String),
  #[error("batch operation failed for {0} of {1} units: {2:?}")]
  BatchFailed(usize, usize, BTreeMap<String, String>),
  #[error(transparent)]
  Bus(#[from] zbus::Error),
}

pub struct ServiceManager {
  system: bool,
  unit_start_timeout: Duration,
  image_pull_timeout: Duration,
}

impl ServiceManager {
  pub fn new(
    scope: Scope,
    running_as_root: bool,
    unit_start_timeout: Duration,
    image_pull_timeout: Duration,
  ) -> Self {
    ServiceManager {
      system: scope.resolve(running_as_root),
      unit_start_timeout,
      image_pull_timeout,
    }
  }

  async fn connect(&self) -> Result<Connection, ManagerError> {
    let conn = if self.system {
      Connection::system().await
    } else {
      Connection::session().await
    };
    conn.map_err(ManagerError::Connect)
  }

  pub async fn daemon_reload(&self) -> Result<(), ManagerError> {
    let conn = self.connect().await?;
    let manager = ManagerProxy::new(&conn).await?;
    manager.reload().await?;
    Ok(())
  }

  pub async fn start(&self, units: &[String]) -> Result<(), ManagerError> {
    self.batch(units, JobKind::Start).await
  }

  pub async fn stop(&self, units: &[String]) -> Result<(), ManagerError> {
    self.batch(units, JobKind::Stop).await
  }

  pub async fn restart(&self, units: &[String]) -> Result<(), ManagerError> {
    self.batch(units, JobKind::Restart).await
  }

  pub async fn disable(&self, units: &[String]) -> Result<(), ManagerError> {
    for unit in units {
      validate_unit_name(unit)?;
    }
    let conn = self.connect().await?;
    let manager = ManagerProxy::new(&conn).await?;
    let refs: Vec<&str> = units.iter().map(String::as_str).collect();
    manager.disable_unit_files(&refs, false).await?;
    Ok(())
  }

  pub async fn reset_failed(&self, unit: &str) -> Result<(), ManagerError> {
    validate_unit_name(unit)?;
    let conn = self.connect().await?;
    let manager = ManagerProxy::new(&conn).await?;
    manager.reset_failed_unit(unit).await?;
    Ok(())
  }

  pub async fn get_unit_property(&self, unit: &str, property: &str) -> Result<String, ManagerError> {
    validate_unit_name(unit)?;
    let conn = self.connect().await?;
    let manager = ManagerProxy::new(&conn).await?;
    let path = manager.get_unit(unit).await?;
    let props = zbus::Proxy::new(&conn, DESTINATION, path, "org.freedesktop.systemd1.Unit")
      .await?;
    let value: zbus::zvariant::OwnedValue = props.get_property(property).await?;
    Ok(display_value(&value))
  }

  pub async fn get_unit_properties(
    &self,
    unit: &str,
    properties: &[&str],
  ) -> Result<BTreeMap<String, String>, ManagerError> {
    let mut out = BTreeMap::new();
    for prop in properties {
      out.insert(prop.to_string(), self.get_unit_property(unit, prop).await?);
    }
    Ok(out)
  }

  /// Fans out `op` over `units`, holding one connection for the whole
  /// batch (§5 "Batch helpers amortize the connect cost"). `Restart`
  /// refuses any unit whose `LoadState` is not `loaded` (§4.4).
  pub async fn batch(&self, units: &[String], op: JobKind) -> Result<(), ManagerError> {
    for unit in units {
      validate_unit_name(unit)?;
    }
    let conn = self.connect().await?;
    let manager = ManagerProxy::new(&conn).await?;

    let mut failures = BTreeMap::new();
    for unit in units {
      if let Err(e) = self.run_job(&conn, &manager, unit, op).await {
        failures.insert(unit.clone(), e.to_string());
      }
    }
    if failures.is_empty() {
      Ok(())
    } else {
      Err(ManagerError::BatchFailed(failures.len(), units.len(), failures))
    }
  }

  async fn run_job(
    &self,
    conn: &Connection,
    manager: &ManagerProxy<'_>,
    unit: &str,
    op: JobKind,
  ) -> Result<(), ManagerError> {
    if op == JobKind::Restart {
      let load_state = self.get_unit_property(unit, "LoadState").await?;
      if load_state != "loaded" {
        return Err(ManagerError::NotLoaded(unit.to_string()));
      }
    }

    let mut stream = manager.receive_job_removed().await?;
    let _job_path = match op {
      JobKind::Start => manager.start_unit(unit, "replace").await?,
      JobKind::Stop => manager.stop_unit(unit, "replace").await?,
      JobKind::Restart => manager.restart_unit(unit, "replace").await?,
    };

    let result = loop {
      match stream.next().await {
        Some(signal) => {
          let args = signal.args().map_err(ManagerError::Bus)?;
          if args.unit == unit {
            break args.result.to_string();
          }
        }
        None => {
          return Err(ManagerError::JobFailed {
            unit: unit.to_string(),
            result: "no-signal".to_string(),
            diagnostic: "job removed stream closed before completion".to_string(),
          });
        }
      }
    };

    if result == "done" {
      return Ok(());
    }

    self.await_activation_or_fail(unit, &result).await
  }

  /// Completion semantics for a non-`done` job result (§4.4).
  async fn await_activation_or_fail(&self, unit: &str, result: &str) -> Result<(), ManagerError> {
    let active_state = self.get_unit_property(unit, "ActiveState").await.unwrap_or_default();
    if active_state != "activating" {
      return Err(self.job_failure(unit, result).await);
    }

    let sub_state = self.get_unit_property(unit, "SubState").await.unwrap_or_default();
    let timeout = if sub_state == "start" {
      self.image_pull_timeout
    } else {
      self.unit_start_timeout
    };

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
      if tokio::time::Instant::now() >= deadline {
        return Err(ManagerError::ActivationTimeout(unit.to_string()));
      }
      tokio::time::sleep(Duration::from_millis(200)).await;
      let state = self.get_unit_property(unit, "ActiveState").await.unwrap_or_default();
      if state == "active" {
        return Ok(());
      }
      if state != "activating" {
        return Err(self.job_failure(unit, result).await);
      }
    }
  }

  async fn job_failure(&self, unit: &str, result: &str) -> ManagerError {
    let props = self
      .get_unit_properties(
        unit,
        &["LoadState", "ActiveState", "SubState", "Result", "MainPID", "ExecMainStatus"],
      )
      .await
      .unwrap_or_default();
    let journal = tail_journal(unit).await;
    let diagnostic = format!("{props:?}\n{journal}");
    ManagerError::JobFailed {
      unit: unit.to_string(),
      result: result.to_string(),
      diagnostic,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
  Start,
  Stop,
  Restart,
}

fn display_value(value: &zbus::zvariant::OwnedValue) -> String {
  value
    .downcast_ref::<str>()
    .map(str::to_string)
    .unwrap_or_else(|_| format!("{value:?}"))
}

/// The only out-of-process call the client makes: log retrieval is not
/// exposed over the control bus (§4.4).
async fn tail_journal(unit: &str) -> String {
  if validate_unit_name(unit).is_err() {
    return String::new();
  }
  let log = run_logged_command(
    "JournalTail",
    None,
    format!("journalctl -u {unit} -n 3 --no-pager"),
  )
  .await;
  log.stdout
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unsafe_unit_name_is_rejected_before_any_bus_call() {
    let result = validate_unit_name("a; rm -rf /");
    assert!(result.is_err());
  }

  #[test]
  fn scope_auto_follows_effective_uid() {
    assert!(Scope::Auto.resolve(true));
    assert!(!Scope::Auto.resolve(false));
    assert!(Scope::System.resolve(false));
    assert!(!Scope::User.resolve(true));
  }
}
