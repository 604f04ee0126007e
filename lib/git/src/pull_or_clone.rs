use std::path::Path;

use crate::{FetchResult, RepoRef};

/// Clones if the repo folder doesn't exist yet, otherwise pulls.
pub async fn pull_or_clone(
  repo: &RepoRef,
  root_repo_dir: &Path,
  access_token: Option<String>,
) -> anyhow::Result<FetchResult> {
  let path = repo.path(root_repo_dir);
  if path.join(".git").exists() {
    crate::pull::pull(repo, root_repo_dir, access_token).await
  } else {
    crate::clone::clone(repo, root_repo_dir, access_token).await
  }
}
