use std::path::Path;

use command::{Log, all_logs_success, run_logged_command, unix_timestamp_ms};
use run_command::async_run_command;

use crate::{FetchResult, RepoRef, get_commit_hash_log};

/// Deletes any existing folder at the destination, clones fresh, and
/// resolves the latest commit hash/message.
pub async fn clone(
  repo: &RepoRef,
  root_repo_dir: &Path,
  access_token: Option<String>,
) -> anyhow::Result<FetchResult> {
  let path = repo.path(root_repo_dir);
  let repo_url = repo.remote_url(access_token.as_deref());

  let mut logs =
    clone_inner(&repo_url, &repo.branch, &path, access_token.as_deref())
      .await;

  if !all_logs_success(&logs) {
    tracing::warn!(
      "failed to clone repo {} at {path:?}",
      repo.name
    );
    return Ok(FetchResult {
      logs,
      path,
      hash: None,
      message: None,
    });
  }

  if let Some(commit) = &repo.commit {
    let reset = run_logged_command(
      "Set commit",
      &path,
      format!("git reset --hard {commit}"),
    )
    .await;
    logs.push(reset);
  }

  let (hash, message) = match get_commit_hash_log(&path).await {
    Ok((log, hash, message)) => {
      logs.push(log);
      (Some(hash), Some(message))
    }
    Err(e) => {
      logs.push(Log::error(
        "Latest commit",
        format!("failed to get latest commit: {e:#}"),
      ));
      (None, None)
    }
  };

  Ok(FetchResult {
    logs,
    path,
    hash,
    message,
  })
}

async fn clone_inner(
  repo_url: &str,
  branch: &str,
  destination: &Path,
  access_token: Option<&str>,
) -> Vec<Log> {
  let _ = std::fs::remove_dir_all(destination);
  let command =
    format!("git clone {repo_url} {} -b {branch}", destination.display());
  let start_ts = unix_timestamp_ms();
  let output = async_run_command(&command).await;
  let success = output.success();
  let (command, stderr) = if let Some(token) = access_token {
    (
      command.replace(token, "<TOKEN>"),
      output.stderr.replace(token, "<TOKEN>"),
    )
  } else {
    (command, output.stderr)
  };
  vec![Log {
    stage: "Clone repo".to_string(),
    command,
    success,
    stdout: output.stdout,
    stderr,
    start_ts,
    end_ts: unix_timestamp_ms(),
  }]
}
