//! forge-backup command-line tool.
//!
//! Mirrors every repository reachable with the configured GitHub / GitLab
//! tokens to local disk, validates configuration files and generates a
//! starter template.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use forge_backup_core::config::BackupConfig;
use forge_backup_core::models::{MirrorOutcome, RunReport};
use forge_backup_core::run::BackupRun;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Back up GitHub and GitLab repositories as local git mirrors.
#[derive(Parser, Debug)]
#[command(name = "forge-backup", version, about)]
struct Cli {
    /// Minimum log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror every configured forge.
    Run {
        /// Configuration file (YAML, or TOML with a .toml extension).
        config: PathBuf,

        /// Also write the run report as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate a configuration file without contacting any forge.
    Validate {
        /// Configuration file to check.
        config: PathBuf,
    },

    /// Generate a configuration template.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./forge-backup.yml")]
        output: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let result = match cli.command {
        Commands::Run { config, report } => cmd_run(&config, report.as_deref()).await,
        Commands::Validate { config } => cmd_validate(&config).map(|()| ExitCode::SUCCESS),
        Commands::Init { output, force } => cmd_init(&output, force).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: &Path, report_path: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    anyhow::ensure!(
        config.ssh_key.is_file(),
        "SSH key not found: {}",
        config.ssh_key.display()
    );

    let run = BackupRun::from_config(config);
    info!(
        forges = run.config().forges.len(),
        save_folder = %run.config().save_folder.display(),
        "starting backup run"
    );
    let report = run.execute().await.context("backup run aborted")?;

    print_summary(&report);
    if let Some(path) = report_path {
        let json = report.to_json().context("failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }
    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("{}", style::success("Configuration is valid"));
    println!("  save folder: {}", config.save_folder.display());
    println!("  ssh key:     {}", config.ssh_key.display());
    if !config.ssh_key.is_file() {
        println!("  {}", style::warn("ssh key file does not exist"));
    }
    match config.healthcheck_url() {
        Some(url) => println!("  healthcheck: {}", url),
        None => println!("  healthcheck: {}", style::dim("disabled")),
    }
    for forge in &config.forges {
        let categories: Vec<String> = forge.categories().iter().map(|c| c.to_string()).collect();
        println!(
            "  - {} ({}): {}{}",
            style::header(forge.display_name()),
            forge.kind,
            categories.join(", "),
            if forge.exclude.is_empty() {
                String::new()
            } else {
                style::dim(&format!(", {} excluded", forge.exclude.len()))
            }
        );
    }
    Ok(())
}

fn cmd_init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }
    std::fs::write(output, BackupConfig::default_template())
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "{}",
        style::success(&format!("Configuration template written to {}", output.display()))
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<BackupConfig> {
    BackupConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn print_summary(report: &RunReport) {
    for failure in &report.forge_failures {
        eprintln!(
            "{}",
            style::error(&format!("forge '{}' failed: {}", failure.forge, failure.message))
        );
    }
    for record in report.failures() {
        if let MirrorOutcome::Failed { exit_code, output } = &record.outcome {
            eprintln!(
                "{}",
                style::error(&format!(
                    "[{}] {} ({}) exited with code {}",
                    style::outcome(&record.outcome),
                    record.full_path,
                    record.local_path.display(),
                    exit_code
                ))
            );
            if !output.is_empty() {
                eprintln!("{}", style::dim(output));
            }
        }
    }

    let elapsed = match (report.started_at, report.completed_at) {
        (Some(start), Some(end)) => format!(" in {}s", (end - start).num_seconds()),
        _ => String::new(),
    };
    let line = format!(
        "{} cloned, {} updated, {} without content, {} excluded, {} failed{}",
        report.count_cloned(),
        report.count_updated(),
        report.count_no_content(),
        report.excluded,
        report.count_failed(),
        elapsed
    );
    if report.has_failures() {
        println!("{}", style::error(&line));
    } else {
        println!("{}", style::success(&line));
    }
}
