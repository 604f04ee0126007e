use std::path::Path;

use command::{Log, all_logs_success, run_logged_command};

use crate::{FetchResult, RepoRef, get_commit_hash_log};

/// Pulls in a way that tolerates the repo folder being in an unexpected
/// state (wrong branch, stale remote, not yet a git repo at all).
pub async fn pull(
  repo: &RepoRef,
  root_repo_dir: &Path,
  access_token: Option<String>,
) -> anyhow::Result<FetchResult> {
  let path = repo.path(root_repo_dir);
  let repo_url = repo.remote_url(access_token.as_deref());

  let mut logs = Vec::new();

  let dot_git = path.join(".git");
  if !dot_git.exists() {
    crate::init::init_folder_as_repo(
      &path,
      &repo_url,
      &repo.branch,
      access_token.as_deref(),
      &mut logs,
    )
    .await;
    if !all_logs_success(&logs) {
      return Ok(FetchResult {
        logs,
        path,
        hash: None,
        message: None,
      });
    }
  }

  let mut set_remote = run_logged_command(
    "Set git remote",
    &path,
    format!("git remote set-url origin {repo_url}"),
  )
  .await;
  if let Some(token) = &access_token {
    set_remote.command = set_remote.command.replace(token, "<TOKEN>");
    set_remote.stdout = set_remote.stdout.replace(token, "<TOKEN>");
    set_remote.stderr = set_remote.stderr.replace(token, "<TOKEN>");
  }
  logs.push(set_remote);
  if !all_logs_success(&logs) {
    return Ok(FetchResult {
      logs,
      path,
      hash: None,
      message: None,
    });
  }

  let checkout = run_logged_command(
    "Checkout branch",
    &path,
    format!("git checkout -f {}", repo.branch),
  )
  .await;
  logs.push(checkout);
  if !all_logs_success(&logs) {
    return Ok(FetchResult {
      logs,
      path,
      hash: None,
      message: None,
    });
  }

  let pull_log = run_logged_command(
    "Git pull",
    &path,
    format!("git pull --rebase --force origin {}", repo.branch),
  )
  .await;
  logs.push(pull_log);
  if !all_logs_success(&logs) {
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

/// Used by the rollback path (`spec.md` §4.5): checks out a specific,
/// already-fetched commit in a repo that is assumed to already be cloned,
/// without moving the branch pointer or pulling new history.
pub async fn checkout_commit(
  repo_dir: &Path,
  commit: &str,
) -> anyhow::Result<FetchResult> {
  let mut logs = Vec::new();

  let checkout = run_logged_command(
    "Checkout commit",
    repo_dir,
    format!("git checkout -f {commit}"),
  )
  .await;
  logs.push(checkout);
  if !all_logs_success(&logs) {
    return Ok(FetchResult {
      logs,
      path: repo_dir.to_path_buf(),
      hash: None,
      message: None,
    });
  }

  let (hash, message) = match get_commit_hash_log(repo_dir).await {
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
    path: repo_dir.to_path_buf(),
    hash,
    message,
  })
}
