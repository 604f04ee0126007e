use std::path::Path;

use command::{Log, run_logged_command};

/// Runs `git log -1` and parses the commit hash and subject line out of it.
/// Returns the [`Log`] of the invocation alongside the parsed values so
/// callers can surface both the raw command output and the parsed result.
pub async fn get_commit_hash_log(
  repo_dir: &Path,
) -> anyhow::Result<(Log, String, String)> {
  let log = run_logged_command(
    "Latest commit",
    repo_dir,
    "git log -1 --format='%H%n%s'",
  )
  .await;
  if !log.success {
    anyhow::bail!(
      "failed to read latest commit: {}",
      log.stderr
    );
  }
  let mut lines = log.stdout.trim().lines();
  let hash = lines
    .next()
    .ok_or_else(|| anyhow::anyhow!("no commit hash in git log output"))?
    .trim()
    .to_string();
  let message = lines.next().unwrap_or_default().trim().to_string();
  Ok((log, hash, message))
}
