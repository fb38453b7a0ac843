mod config;

use clap::{Parser, Subcommand};
use config::ShipyardConfig;
use shipyard_core::ShipyardError;
use shipyard_engine::{ClaudeCodeEngine, ExecutionEngine};
use shipyard_orchestrator::{Orchestrator, RunReport, Task, ValidationReport, Validator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status after Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "shipyard", about = "Shipyard: goal-driven task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "shipyard.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a goal and run it to completion
    Run {
        /// Goal file, or `-` for stdin
        goal: String,
        /// Worker pool size (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Model alias (overrides config)
        #[arg(short, long)]
        model: Option<String>,
        /// Directory the engine works in (overrides config)
        #[arg(long)]
        working_dir: Option<PathBuf>,
        /// Markdown progress file (overrides config)
        #[arg(long)]
        progress_file: Option<PathBuf>,
        /// Review every completed task
        #[arg(long)]
        review: bool,
        /// Validate the goal before planning; a rejection aborts the run
        #[arg(long)]
        validate: bool,
        /// Print the run report as JSON
        #[arg(long)]
        report_json: bool,
    },
    /// Check whether a goal is specific enough to plan from
    Validate {
        /// Goal file, or `-` for stdin
        goal: String,
        /// Write the generated PROJECT.md here when accepted
        #[arg(long)]
        write_project: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn read_goal(source: &str) -> anyhow::Result<String> {
    let text = if source == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(Path::new(source))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read goal file '{}': {}", source, e))?
    };
    if text.trim().is_empty() {
        anyhow::bail!("goal is empty");
    }
    Ok(text)
}

fn print_validation(report: &ValidationReport) {
    if report.accept {
        println!("Design accepted.");
    } else {
        println!("Design rejected. Gaps:");
        for gap in &report.gaps {
            println!("  - {gap}");
        }
    }
}

fn error_line(task: &Task) -> String {
    format!(
        "  {} [{}] {} (retries: {}): {}",
        task.short_id(),
        task.status,
        task.description,
        task.retries,
        task.error.as_deref().unwrap_or_default()
    )
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{}", report.summary);
    if let Some(context) = &report.project_context {
        println!("Project: {context}");
    }
    for task in report.tasks.iter().filter(|t| t.error.is_some()) {
        println!("{}", error_line(task));
    }
    println!(
        "Success rate: {:.0}%, workers busy {:.1}s",
        report.success_rate() * 100.0,
        report.worker_metrics.busy_ms as f64 / 1000.0
    );
    println!("Elapsed: {:.1}s", report.elapsed_ms as f64 / 1000.0);
    Ok(())
}

/// Cancel the token on the first Ctrl-C.
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, shutting down");
            cancel.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = ShipyardConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Run {
            goal,
            workers,
            model,
            working_dir,
            progress_file,
            review,
            validate,
            report_json,
        } => {
            if let Some(workers) = workers {
                config.orchestrator.num_workers = workers;
            }
            if let Some(model) = model {
                config.engine.model_id = model;
            }
            if working_dir.is_some() {
                config.engine.working_dir = working_dir;
            }
            if progress_file.is_some() {
                config.orchestrator.progress_file = progress_file;
            }
            if review {
                config.orchestrator.review_completed = true;
            }
            config.orchestrator.validate()?;

            let goal = read_goal(&goal).await?;
            let engine: Arc<dyn ExecutionEngine> = Arc::new(ClaudeCodeEngine::new(config.engine));

            if validate {
                let validator = Validator::new(engine.clone(), config.orchestrator.planning_timeout());
                let verdict = validator.validate(&goal).await?;
                if !verdict.accept {
                    print_validation(&verdict);
                    anyhow::bail!("design rejected with {} gap(s)", verdict.gaps.len());
                }
                info!("design accepted");
            }

            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());

            let orchestrator = Orchestrator::new(config.orchestrator, engine);
            match orchestrator.run(&goal, cancel).await {
                Ok(report) => print_report(&report, report_json)?,
                Err(ShipyardError::Cancelled) => {
                    error!("run interrupted");
                    std::process::exit(EXIT_INTERRUPTED);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Validate {
            goal,
            write_project,
        } => {
            let goal = read_goal(&goal).await?;
            let engine = Arc::new(ClaudeCodeEngine::new(config.engine));
            let validator = Validator::new(engine, config.orchestrator.planning_timeout());
            let verdict = validator.validate(&goal).await?;
            print_validation(&verdict);

            if let (true, Some(path), Some(project)) =
                (verdict.accept, write_project, verdict.project_md.as_deref())
            {
                tokio::fs::write(&path, project).await?;
                println!("Wrote {}", path.display());
            }
            if !verdict.accept {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
