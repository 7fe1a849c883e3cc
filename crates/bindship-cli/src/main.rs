//! bindship - gated release pipeline CLI
//!
//! Builds generated bindings, stages them into a package repository, runs
//! the package's test suites against the staged tree and publishes a tagged
//! commit only when every gate passed.
//!
//! ## Commands
//!
//! - `run`: Execute the full release pipeline for a tag
//! - `publish`: Push a release whose local commit and tag survived a failed push
//! - `plan`: Print the stage list without executing anything

use anyhow::{Context, Result};
use bindship_ci::{
    credential_provider, publish_manager, release_stages, CancelSignal, CommandRunner,
    Orchestrator, PipelineResult, ProcessRunner, ReleaseSpec, Stage, StageStatus,
};
use bindship_core::{load_config, ReleaseConfig, DEFAULT_CONFIG_FILE};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "bindship")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Gated release pipeline for generated bindings", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to the release configuration
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, stage, test and publish a release
    Run {
        /// Version tag to publish (used as given)
        #[arg(short, long, env = "BINDSHIP_TAG")]
        tag: String,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json_report: bool,

        #[command(flatten)]
        overrides: TargetOverrides,
    },

    /// Push the local release commit and tag left by a failed push
    ///
    /// Does not build, stage or run any suite. The tag must exist in the
    /// checkout and point at HEAD.
    Publish {
        /// Version tag to push
        #[arg(short, long, env = "BINDSHIP_TAG")]
        tag: String,

        #[command(flatten)]
        overrides: TargetOverrides,
    },

    /// Show the stages a run would execute
    Plan {
        #[command(flatten)]
        overrides: TargetOverrides,
    },
}

/// Command-line overrides for the `[target]` section.
#[derive(clap::Args, Debug, Default)]
struct TargetOverrides {
    /// Remote URL of the package repository
    #[arg(long)]
    remote_url: Option<String>,

    /// Local checkout directory of the package repository
    #[arg(long)]
    checkout_dir: Option<PathBuf>,

    /// Branch to publish to
    #[arg(long)]
    branch: Option<String>,
}

impl TargetOverrides {
    fn apply(self, config: &mut ReleaseConfig) {
        if let Some(url) = self.remote_url {
            config.target.remote_url = url;
        }
        if let Some(dir) = self.checkout_dir {
            config.target.checkout_dir = dir;
        }
        if let Some(branch) = self.branch {
            config.target.branch = branch;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    bindship_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            tag,
            json_report,
            overrides,
        } => cmd_run(&cli.config, &tag, json_report, overrides).await,
        Commands::Publish { tag, overrides } => cmd_publish(&cli.config, &tag, overrides).await,
        Commands::Plan { overrides } => cmd_plan(&cli.config, overrides),
    }
}

fn load(path: &Path, overrides: TargetOverrides) -> Result<ReleaseConfig> {
    let mut config = load_config(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    overrides.apply(&mut config);
    config.validate().context("Invalid release configuration")?;
    Ok(config)
}

fn assemble(config: &ReleaseConfig) -> Vec<Stage> {
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
    release_stages(config, runner, credential_provider(config))
}

fn stage_names(stages: &[Stage]) -> Vec<String> {
    stages.iter().map(|s| s.name().to_string()).collect()
}

async fn cmd_run(
    config_path: &Path,
    tag: &str,
    json_report: bool,
    overrides: TargetOverrides,
) -> Result<()> {
    if tag.trim().is_empty() {
        anyhow::bail!("A release tag is required (--tag or BINDSHIP_TAG)");
    }

    let config = load(config_path, overrides)?;
    let stages = assemble(&config);
    let release = ReleaseSpec::new(tag, &config.build.working_dir, &stage_names(&stages));

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping before the next stage");
            on_interrupt.cancel();
        }
    });

    info!(tag = %tag, remote = %config.target.remote_url, "Releasing");
    let result = Orchestrator::new(cancel).run(&release, stages).await;

    if json_report {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize run report")?
        );
    } else {
        print_report(&result);
    }

    if let Some(stage) = &result.failed_stage {
        match &result.error {
            Some(e) => anyhow::bail!("Release {} failed at stage '{}': {}", tag, stage, e),
            None => anyhow::bail!("Release {} failed at stage '{}'", tag, stage),
        }
    }
    Ok(())
}

async fn cmd_publish(config_path: &Path, tag: &str, overrides: TargetOverrides) -> Result<()> {
    if tag.trim().is_empty() {
        anyhow::bail!("A release tag is required (--tag or BINDSHIP_TAG)");
    }

    let config = load(config_path, overrides)?;
    let manager = publish_manager(&config, credential_provider(&config));
    let owned_tag = tag.to_string();

    info!(tag = %tag, remote = %config.target.remote_url, "Resuming publish");
    let published = tokio::task::spawn_blocking(move || manager.resume(&owned_tag))
        .await
        .context("Publish task failed")?
        .with_context(|| format!("Release {} could not be published", tag))?;

    println!(
        "Published {} at {} on {} (resumed)",
        published.tag, published.commit_sha, published.branch
    );
    Ok(())
}

fn cmd_plan(config_path: &Path, overrides: TargetOverrides) -> Result<()> {
    let config = load(config_path, overrides)?;
    let stages = assemble(&config);

    println!("Target: {} ({})", config.target.remote_url, config.target.branch);
    println!("Checkout: {}", config.target.checkout_dir.display());
    println!("Artifact: {}", config.target.artifact_path.display());
    println!();
    for (idx, stage) in stages.iter().enumerate() {
        println!("  {}. {}", idx + 1, stage.name());
        println!("     {}", stage.describe());
    }
    Ok(())
}

fn status_mark(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Succeeded => "✓",
        StageStatus::Failed => "✗",
        StageStatus::Running => "…",
        StageStatus::Pending => "-",
    }
}

fn print_report(result: &PipelineResult) {
    println!();
    println!("Run ID: {}", result.run_id);
    println!("Tag: {}", result.release.tag);
    println!(
        "Status: {}",
        if result.success() { "✓ PASSED" } else { "✗ FAILED" }
    );
    println!("Duration: {}ms", result.duration_ms);
    println!();

    for stage in &result.stages {
        println!(
            "  {} {} ({}, {}ms)",
            status_mark(stage.status),
            stage.name,
            stage.status,
            stage.duration_ms
        );
        if let Some(error) = &stage.error {
            for line in error.lines() {
                println!("      {}", line);
            }
        }
    }

    println!();
    println!(
        "Summary: {}/{} stages passed",
        result.passed_count(),
        result.stages.len()
    );
    if let Some(published) = &result.published {
        println!(
            "Published {} at {} on {}{}",
            published.tag,
            published.commit_sha,
            published.branch,
            if published.resumed { " (resumed)" } else { "" }
        );
    }
}
