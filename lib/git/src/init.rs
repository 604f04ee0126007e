use std::path::Path;

use command::{Log, all_logs_success, run_logged_command};

/// Initializes an existing (non-git) folder as a git repo pointed at
/// `repo_url`/`branch`, so [`crate::pull`] can be used uniformly whether
/// the folder pre-existed or not.
pub async fn init_folder_as_repo(
  folder_path: &Path,
  repo_url: &str,
  branch: &str,
  access_token: Option<&str>,
  logs: &mut Vec<Log>,
) {
  tokio::fs::create_dir_all(folder_path).await.ok();

  let init_repo =
    run_logged_command("Git init", folder_path, "git init").await;
  logs.push(init_repo);
  if !all_logs_success(logs) {
    return;
  }

  let mut set_remote = run_logged_command(
    "Add git remote",
    folder_path,
    format!("git remote add origin {repo_url}"),
  )
  .await;
  if let Some(token) = access_token {
    set_remote.command = set_remote.command.replace(token, "<TOKEN>");
    set_remote.stdout = set_remote.stdout.replace(token, "<TOKEN>");
    set_remote.stderr = set_remote.stderr.replace(token, "<TOKEN>");
  }
  let remote_ok = set_remote.success;
  logs.push(set_remote);
  if !remote_ok {
    return;
  }

  let switch = run_logged_command(
    "Set branch",
    folder_path,
    format!("git switch -c {branch}"),
  )
  .await;
  logs.push(switch);
}
