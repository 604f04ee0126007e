//! Thin wrapper around the `git` CLI for the one collaborator `spec.md` §1
//! calls out as external: fetching a repository to a known revision.
//!
//! This crate does not interpret Compose files or manage state; it only
//! gets bytes onto disk at the right commit and reports what it did.

use std::path::{Path, PathBuf};

use command::Log;

mod clone;
mod hash;
mod init;
mod pull;
mod pull_or_clone;

pub use clone::clone;
pub use hash::get_commit_hash_log;
pub use pull::{checkout_commit, pull};
pub use pull_or_clone::pull_or_clone;

/// Replaces characters that are awkward in a filesystem path
/// (namely `/`) so a repo name can be used as a directory name.
pub fn to_path_compatible_name(name: &str) -> String {
  name.replace(['/', ' '], "_")
}

/// A repository reference as configured by the user: name, remote URL,
/// branch, and an optional pinned commit.
#[derive(Debug, Clone)]
pub struct RepoRef {
  pub name: String,
  pub url: String,
  pub branch: String,
  pub commit: Option<String>,
}

impl RepoRef {
  pub fn path(&self, root: &Path) -> PathBuf {
    root.join(to_path_compatible_name(&self.name))
  }

  /// Injects an access token into an `https://` remote url as basic auth.
  /// Non-`https` urls (ssh, local paths used in tests) are returned as-is.
  pub fn remote_url(&self, access_token: Option<&str>) -> String {
    match (access_token, self.url.strip_prefix("https://")) {
      (Some(token), Some(rest)) => {
        format!("https://{token}@{rest}")
      }
      _ => self.url.clone(),
    }
  }
}

/// Outcome of a clone or pull.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
  pub logs: Vec<Log>,
  pub path: PathBuf,
  pub hash: Option<String>,
  pub message: Option<String>,
}

impl FetchResult {
  pub fn success(&self) -> bool {
    command::all_logs_success(&self.logs)
  }
}
