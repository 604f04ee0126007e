use std::path::Path;

use run_command::{CommandOutput, async_run_command};
use serde::{Deserialize, Serialize};

/// A single recorded execution of an external process.
///
/// Every subprocess the reconciler spawns (git, the container engine CLI,
/// `journalctl`) goes through [`run_logged_command`] so the run is captured
/// uniformly for diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Log {
  pub stage: String,
  pub command: String,
  pub stdout: String,
  pub stderr: String,
  pub success: bool,
  pub start_ts: i64,
  pub end_ts: i64,
}

impl Log {
  pub fn error(stage: impl Into<String>, stderr: impl Into<String>) -> Log {
    Log {
      stage: stage.into(),
      stderr: stderr.into(),
      success: false,
      ..Default::default()
    }
  }
}

/// Milliseconds since the unix epoch. Never `Date.now()`-style wall clock
/// assumptions are made about this outside of logging/diagnostics.
pub fn unix_timestamp_ms() -> i64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_millis() as i64)
    .unwrap_or_default()
}

pub fn all_logs_success(logs: &[Log]) -> bool {
  logs.iter().all(|log| log.success)
}

/// Runs `command` with `path` as the working directory (if given), recording
/// the full invocation as a [`Log`].
pub async fn run_logged_command(
  stage: &str,
  path: impl Into<Option<&Path>>,
  command: impl AsRef<str>,
) -> Log {
  let command = if let Some(path) = path.into() {
    format!("cd {} && {}", path.display(), command.as_ref())
  } else {
    command.as_ref().to_string()
  };
  let start_ts = unix_timestamp_ms();
  let output = async_run_command(&command).await;
  output_into_log(stage, command, start_ts, output)
}

pub fn output_into_log(
  stage: &str,
  command: String,
  start_ts: i64,
  output: CommandOutput,
) -> Log {
  let success = output.success();
  Log {
    stage: stage.to_string(),
    stdout: output.stdout,
    stderr: output.stderr,
    command,
    success,
    start_ts,
    end_ts: unix_timestamp_ms(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn captures_stdout_and_success() {
    let log = run_logged_command("Echo", None, "echo hello").await;
    assert!(log.success);
    assert_eq!(log.stdout.trim(), "hello");
  }

  #[tokio::test]
  async fn failing_command_is_not_success() {
    let log = run_logged_command("False", None, "false").await;
    assert!(!log.success);
  }

  #[test]
  fn all_logs_success_is_vacuously_true() {
    assert!(all_logs_success(&[]));
  }
}
