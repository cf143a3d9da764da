//! runwatch - drive GitHub Actions workflows from the command line
//!
//! ## Commands
//!
//! - `trigger`: Dispatch a workflow and record the run it created
//! - `monitor`: Follow a run until it completes
//! - `collect-logs`: Write the failure report for a run
//! - `run`: Trigger, then monitor the new run

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, Level};

use runwatch_core::{
    parse_inputs, repo_root, CancelFlag, LogCollector, Orchestrator, RunwatchConfig,
    RunwatchContext, RunwatchError, StatusPoller, TriggerRequest, WorkflowDefinition,
    WorkflowTrigger,
};

/// Exit code after an interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "runwatch")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trigger, monitor and diagnose GitHub Actions workflow runs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Repository root (default: the enclosing git work tree)
    #[arg(long, global = true, env = "RUNWATCH_PROJECT_ROOT")]
    project_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a workflow and record the run it created
    Trigger {
        /// Workflow file (e.g. build.yml or .github/workflows/build.yml) or numeric ID
        workflow: String,

        /// Branch, tag or SHA to run on (default: current branch)
        #[arg(long = "ref")]
        git_ref: Option<String>,

        /// Workflow input, repeatable
        #[arg(short = 'f', long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
    },

    /// Follow a run until it completes
    Monitor {
        /// Run ID (default: the last triggered run)
        run_id: Option<u64>,

        /// Seconds between status checks
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },

    /// Write the failure report for a run
    CollectLogs {
        /// Run ID (default: the last triggered run)
        run_id: Option<u64>,
    },

    /// Trigger a workflow, then monitor the new run
    Run {
        /// Workflow file or numeric ID
        workflow: String,

        /// Branch, tag or SHA to run on (default: current branch)
        #[arg(long = "ref")]
        git_ref: Option<String>,

        /// Workflow input, repeatable
        #[arg(short = 'f', long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// Seconds between status checks
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    runwatch_core::init_tracing(cli.json, level);

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            1
        }
    };
    std::process::exit(code);
}

async fn execute(cli: Cli) -> Result<i32> {
    let root = project_root(cli.project_root)?;
    let config = RunwatchConfig::from_env(root)?;
    debug!(root = %config.project_root.display(), "configuration loaded");

    let ctx = RunwatchContext::production(config);
    spawn_interrupt_handler(ctx.cancel.clone());

    dispatch(&ctx, cli.command).await
}

/// Run one subcommand. An error caused by an interrupt exits 130 instead of 1.
async fn dispatch(ctx: &RunwatchContext, command: Commands) -> Result<i32> {
    let result = match command {
        Commands::Trigger {
            workflow,
            git_ref,
            inputs,
        } => cmd_trigger(ctx, &workflow, git_ref, &inputs).await,
        Commands::Monitor { run_id, interval } => cmd_monitor(ctx, run_id, interval).await,
        Commands::CollectLogs { run_id } => cmd_collect_logs(ctx, run_id).await,
        Commands::Run {
            workflow,
            git_ref,
            inputs,
            interval,
        } => cmd_run(ctx, &workflow, git_ref, &inputs, interval).await,
    };
    match result {
        Err(e) if is_interrupt(ctx, &e) => {
            debug!(error = %e, "stopped by interrupt");
            Ok(EXIT_INTERRUPTED)
        }
        other => other,
    }
}

fn is_interrupt(ctx: &RunwatchContext, err: &anyhow::Error) -> bool {
    ctx.cancel.is_cancelled()
        || matches!(
            err.downcast_ref::<RunwatchError>(),
            Some(RunwatchError::Interrupted)
        )
}

/// Explicit root, else the git work tree around the current directory, else the current directory.
fn project_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(root) = explicit {
        return Ok(root);
    }
    let cwd = std::env::current_dir().context("cannot determine the current directory")?;
    let git = std::env::var("RUNWATCH_GIT_BIN").unwrap_or_else(|_| "git".to_string());
    Ok(repo_root(&git, &cwd).unwrap_or(cwd))
}

/// Ctrl+C flips the cancel flag; the running operation winds down on its own.
fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
}

fn report_error(err: &anyhow::Error) {
    eprintln!("error: {err:#}");
    if let Some(hint) = err
        .downcast_ref::<RunwatchError>()
        .and_then(RunwatchError::remedy)
    {
        eprintln!("hint: {hint}");
    }
}

fn build_request(
    ctx: &RunwatchContext,
    workflow: &str,
    git_ref: Option<String>,
    inputs: &[String],
) -> Result<TriggerRequest> {
    Ok(TriggerRequest {
        workflow: WorkflowDefinition::resolve(workflow, &ctx.config.project_root)?,
        git_ref,
        inputs: parse_inputs(inputs)?,
    })
}

fn interval_or_default(ctx: &RunwatchContext, interval: Option<u64>) -> Duration {
    interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.config.poll_interval())
}

/// Dispatch a workflow and print how to follow it
async fn cmd_trigger(
    ctx: &RunwatchContext,
    workflow: &str,
    git_ref: Option<String>,
    inputs: &[String],
) -> Result<i32> {
    let request = build_request(ctx, workflow, git_ref, inputs)?;
    let outcome = WorkflowTrigger::trigger(ctx, &request).await?;
    if ctx.cancel.is_cancelled() {
        return Ok(EXIT_INTERRUPTED);
    }

    let console = ctx.console.as_ref();
    if !outcome.success {
        for line in outcome.message.lines() {
            console.error(line);
        }
        return Ok(1);
    }

    for line in outcome.message.lines() {
        console.line(line);
    }

    match outcome.run_id {
        Some(run_id) => {
            console.line(&format!(
                "Run ID saved to: {}",
                ctx.config.state_path().display()
            ));
            print_run_info(ctx, run_id).await;
            console.blank();
            console.line("Monitor it with:");
            console.line(&format!("  runwatch monitor {run_id}"));
        }
        None => console.warn("no run ID was recorded; pass one explicitly to `runwatch monitor`"),
    }
    Ok(0)
}

/// Best-effort status line for a freshly triggered run.
async fn print_run_info(ctx: &RunwatchContext, run_id: u64) {
    let console = ctx.console.as_ref();
    match ctx.provider.run_status(run_id).await {
        Ok(snapshot) => {
            console.line(&format!("Status: {}", snapshot.status));
            let conclusion = snapshot
                .conclusion
                .map(|c| c.to_string())
                .unwrap_or_else(|| "running".to_string());
            console.line(&format!("Conclusion: {conclusion}"));
        }
        Err(e) => debug!(run_id, error = %e, "status unavailable after trigger"),
    }
    match ctx.provider.run_metadata(run_id).await {
        Ok(meta) if !meta.url.is_empty() => console.line(&format!("URL: {}", meta.url)),
        Ok(_) => {}
        Err(e) => debug!(run_id, error = %e, "metadata unavailable after trigger"),
    }
}

/// Follow a run to completion
async fn cmd_monitor(ctx: &RunwatchContext, run_id: Option<u64>, interval: Option<u64>) -> Result<i32> {
    let outcome = StatusPoller::monitor(ctx, run_id, interval_or_default(ctx, interval)).await?;
    Ok(outcome.exit_code())
}

/// Write the failure report and print its path
async fn cmd_collect_logs(ctx: &RunwatchContext, run_id: Option<u64>) -> Result<i32> {
    let path = LogCollector::collect_requested(ctx, run_id).await?;
    ctx.console
        .line(&format!("Error log saved to: {}", path.display()));
    Ok(0)
}

/// Trigger, then monitor
async fn cmd_run(
    ctx: &RunwatchContext,
    workflow: &str,
    git_ref: Option<String>,
    inputs: &[String],
    interval: Option<u64>,
) -> Result<i32> {
    let request = build_request(ctx, workflow, git_ref, inputs)?;
    let outcome = Orchestrator::run(ctx, &request, interval_or_default(ctx, interval)).await?;
    if ctx.cancel.is_cancelled() {
        return Ok(EXIT_INTERRUPTED);
    }
    Ok(outcome.exit_code())
}
