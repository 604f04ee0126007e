//! CLI surface (`spec.md` §6), shaped after the teacher's `CliArgs`
//! (`bin/periphery/src/config.rs`): a top-level struct with global flags
//! plus a subcommand enum.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "quadsync", version, about = "GitOps reconciler for Compose-to-systemd workloads")]
pub struct Cli {
  /// Path to the YAML config file. `~` is expanded against `$HOME`.
  #[arg(long, global = true)]
  pub config: Option<String>,

  #[arg(long, global = true)]
  pub debug: bool,

  #[arg(long, global = true)]
  pub verbose: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
  /// Reconcile entry point.
  Sync {
    /// Check out each repository's previous recorded revision instead of
    /// fetching, and swap current/previous in the state store.
    #[arg(long)]
    rollback: bool,
  },
  /// Start all (or filtered) containers.
  Up {
    project: Option<String>,
    #[arg(short = 's', long = "service")]
    services: Vec<String>,
  },
  /// Stop all (or filtered) containers.
  Down {
    project: Option<String>,
    #[arg(short = 's', long = "service")]
    services: Vec<String>,
  },
  /// Dry-translate and probe secrets without writing artifacts.
  Validate {
    path: Option<String>,
  },
  /// Print identity and build metadata.
  Version,
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn cli_definition_is_well_formed() {
    Cli::command().debug_assert();
  }

  #[test]
  fn parses_sync_with_rollback_flag() {
    let cli = Cli::parse_from(["quadsync", "sync", "--rollback"]);
    match cli.command {
      Command::Sync { rollback } => assert!(rollback),
      other => panic!("expected Sync, got {other:?}"),
    }
  }

  #[test]
  fn parses_up_with_service_filters() {
    let cli = Cli::parse_from(["quadsync", "up", "myproj", "-s", "web", "-s", "db"]);
    match cli.command {
      Command::Up { project, services } => {
        assert_eq!(project.as_deref(), Some("myproj"));
        assert_eq!(services, vec!["web".to_string(), "db".to_string()]);
      }
      other => panic!("expected Up, got {other:?}"),
    }
  }
}
