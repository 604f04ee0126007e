//! Error category classification (`spec.md` §7). These are not exception
//! types callers match exhaustively on; they document which failures are
//! fatal to the whole invocation vs scoped to a repository/project, so
//! `main` can decide the right exit code and log level.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  /// Fatal at startup: missing/unreadable config, malformed YAML.
  #[error("configuration error: {0}")]
  Configuration(#[source] anyhow::Error),

  /// Per-repository; other repositories still get processed.
  #[error("repository error ({repo}): {source}")]
  Repository {
    repo: String,
    #[source]
    source: anyhow::Error,
  },

  /// Project-level; the reconcile continues past it.
  #[error("translation warning ({project}): {source}")]
  TranslationWarning {
    project: String,
    #[source]
    source: anyhow::Error,
  },

  /// Repo-level fatal: directory or file creation failure.
  #[error("artifact write error: {0}")]
  ArtifactWrite(#[source] anyhow::Error),

  /// Reconcile-fatal: failure to write the state file.
  #[error("state persistence error: {0}")]
  StatePersistence(#[source] anyhow::Error),

  /// Operation-level, aggregated across a batch.
  #[error("service-manager error: {0}")]
  ServiceManager(#[source] anyhow::Error),

  /// Boundary, fatal to the operation: unsafe unit name.
  #[error("validation error: {0}")]
  Validation(#[from] crate::validate::ValidationError),
}

impl AppError {
  /// Process exit code convention: configuration and validation errors
  /// are operator mistakes (`2`); everything else is a runtime failure (`1`).
  pub fn exit_code(&self) -> i32 {
    match self {
      AppError::Configuration(_) | AppError::Validation(_) => 2,
      _ => 1,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn configuration_errors_exit_with_code_two() {
    let err = AppError::Configuration(anyhow::anyhow!("bad yaml"));
    assert_eq!(err.exit_code(), 2);
  }

  #[test]
  fn repository_errors_exit_with_code_one() {
    let err = AppError::Repository {
      repo: "r1".into(),
      source: anyhow::anyhow!("fetch failed"),
    };
    assert_eq!(err.exit_code(), 1);
  }
}
