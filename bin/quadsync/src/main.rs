//! `quadsync` — GitOps reconciler entry point (`spec.md` §6).

mod changes;
mod cli;
mod compose;
mod config;
mod error;
mod model;
mod reconcile;
mod secrets;
mod state;
mod svcmgr;
mod translate;
mod validate;

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use tracing::info;

use cli::{Cli, Command};
use config::AppConfig;

#[tokio::main]
async fn main() {
  let cli = Cli::parse();

  let log_config = logger::LogConfig {
    level: if cli.debug {
      logger::LogLevel::Debug
    } else {
      logger::LogLevel::Info
    },
    stdio: logger::StdioLogMode::Standard,
    pretty: cli.verbose,
  };
  if let Err(e) = logger::init(&log_config) {
    eprintln!("failed to initialize logging: {e:#}");
  }

  match run(cli).await {
    Ok(code) => std::process::exit(code),
    Err(e) => {
      eprintln!("{}", formatting::format_error_chain(&e));
      std::process::exit(1);
    }
  }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
  let running_as_root = config::running_as_root();
  let config_path = resolve_config_path(cli.config.as_deref(), running_as_root);

  let app_config: AppConfig = config_lib::load_config(&config_path)
    .map_err(anyhow::Error::from)?
    .unwrap_or_default();

  if cli.verbose {
    print_banner(&app_config, running_as_root, &config_path);
  }

  match cli.command {
    Command::Sync { rollback } => {
      let mode = if rollback {
        reconcile::Mode::Rollback
      } else {
        reconcile::Mode::Sync
      };
      let reconciler = reconcile::Reconciler::new(&app_config, running_as_root);
      match reconciler.reconcile(mode).await {
        Ok(report) => {
          info!(
            restarted = report.restarted.len(),
            started = report.started.len(),
            removed = report.removed_stale.len(),
            "sync complete"
          );
          Ok(0)
        }
        Err(e) => {
          eprintln!("{}", formatting::format_error_chain(&e));
          Ok(1)
        }
      }
    }
    Command::Up { project, services } => {
      let started = reconcile::up(&app_config, running_as_root, project.as_deref(), &services).await?;
      info!(count = started.len(), "up complete");
      Ok(0)
    }
    Command::Down { project, services } => {
      let stopped = reconcile::down(&app_config, running_as_root, project.as_deref(), &services).await?;
      info!(count = stopped.len(), "down complete");
      Ok(0)
    }
    Command::Validate { path } => run_validate(&app_config, running_as_root, path.as_deref()).await,
    Command::Version => {
      println!(
        "quadsync {} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::ARCH,
      );
      Ok(0)
    }
  }
}

/// Dry-translates and probes secrets without writing artifacts (§6).
async fn run_validate(
  config: &AppConfig,
  running_as_root: bool,
  path: Option<&str>,
) -> anyhow::Result<i32> {
  let root = match path {
    Some(p) => PathBuf::from(p),
    None => config.repository_dir(running_as_root),
  };
  let projects = compose::discover_projects(&root)?;
  if projects.is_empty() {
    println!("no compose projects found under {}", root.display());
    return Ok(1);
  }

  let mut errors = 0;
  for project_dir in projects {
    match compose::load_project(&project_dir) {
      Ok(project) => match translate::translate_project(&project, running_as_root) {
        Ok(artifacts) => println!(
          "{} {} ({} artifacts)",
          "OK".green().bold(),
          project.name,
          artifacts.len()
        ),
        Err(e) => {
          errors += 1;
          println!("{} {}: {e}", "FAIL".red().bold(), project.name);
        }
      },
      Err(e) => {
        errors += 1;
        println!(
          "{} {}: {e:#}",
          "FAIL".red().bold(),
          project_dir.display()
        );
      }
    }
  }

  Ok(if errors > 0 { 1 } else { 0 })
}

fn resolve_config_path(explicit: Option<&str>, running_as_root: bool) -> PathBuf {
  if let Some(p) = explicit {
    return config::expand_tilde(p);
  }
  if running_as_root {
    PathBuf::from("/etc/quad-ops/config.yaml")
  } else {
    config::expand_tilde("~/.config/quad-ops/config.yaml")
  }
}

fn print_banner(config: &AppConfig, running_as_root: bool, config_path: &std::path::Path) {
  println!("{}", "quadsync".bold());
  println!("  {} {}", "config:".dimmed(), config_path.display());
  println!(
    "  {} {}",
    "repositoryDir:".dimmed(),
    config.repository_dir(running_as_root).display()
  );
  println!(
    "  {} {}",
    "quadletDir:".dimmed(),
    config.quadlet_dir(running_as_root).display()
  );
  println!(
    "  {} {}",
    "scope:".dimmed(),
    if running_as_root { "system" } else { "user" }
  );
}
