use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use telos::agent::{AgentRuntime, ClaudeCliRuntime};
use telos::config::Config;
use telos::domain::{RunStatus, Verdict};
use telos::id::generate_build_id;
use telos::orchestrator::{Orchestrator, SelectionReason, select_next};
use telos::planning::Planner;
use telos::ralph::{RalphLoop, RunReport, StatusSnapshot};
use telos::review::ReviewerServer;
use telos::store::{BuildStore, FileStore};

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("telos")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("telos.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn project_dir(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).context(format!("Project directory {} not found", path.display()))
}

fn runtime(config: &Config, project_dir: &Path) -> Arc<dyn AgentRuntime> {
    Arc::new(ClaudeCliRuntime::new(config.agent.clone(), project_dir))
}

async fn run_application(cli: &Cli, mut config: Config) -> Result<bool> {
    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::GeneratePlan { project, transcript } => {
            let dir = project_dir(&project.project_dir)?;
            handle_generate_plan(&dir, transcript, &config).await?;
            Ok(true)
        }
        Commands::GeneratePrds { project } => {
            let dir = project_dir(&project.project_dir)?;
            handle_generate_prds(&dir, &config).await?;
            Ok(true)
        }
        Commands::Execute { project, args } => {
            args.apply(&mut config)?;
            let dir = project_dir(&project.project_dir)?;
            handle_execute(&dir, &config).await
        }
        Commands::Run { project, transcript, args } => {
            args.apply(&mut config)?;
            let dir = project_dir(&project.project_dir)?;
            handle_generate_plan(&dir, transcript, &config).await?;
            handle_generate_prds(&dir, &config).await?;
            handle_execute(&dir, &config).await
        }
        Commands::Status { project } => {
            handle_status(&project_dir(&project.project_dir)?, &config)?;
            Ok(true)
        }
        Commands::Prds { project } => {
            handle_prds(&project_dir(&project.project_dir)?, &config)?;
            Ok(true)
        }
        Commands::Progress { project } => {
            handle_progress(&project_dir(&project.project_dir)?, &config)?;
            Ok(true)
        }
        Commands::ReviewerMcp => {
            let verdict_path = std::env::var_os("VERDICT_PATH").map(PathBuf::from);
            ReviewerServer::new(verdict_path).serve().await.context("Reviewer MCP server failed")?;
            Ok(true)
        }
    }
}

async fn handle_generate_plan(dir: &Path, transcript: &Path, config: &Config) -> Result<()> {
    let transcript = fs::read_to_string(transcript)
        .context(format!("Failed to read transcript {}", transcript.display()))?;
    println!("{} {}", "Planning:".green(), dir.display());

    let planner = Planner::from_config(runtime(config, dir), config, dir).context("Failed to set up planner")?;
    let path = planner.generate_plan(&transcript).await.context("Plan generation failed")?;
    println!("{} {}", "Wrote".green(), path.display());
    Ok(())
}

async fn handle_generate_prds(dir: &Path, config: &Config) -> Result<()> {
    println!("{} {}", "Generating PRDs:".green(), dir.display());
    let planner = Planner::from_config(runtime(config, dir), config, dir).context("Failed to set up planner")?;
    let prds = planner.generate_prds().await.context("PRD generation failed")?;
    for prd in prds.prds() {
        println!("  {} {} ({} items)", prd.reference.to_string().cyan(), prd.title, prd.items.len());
    }
    Ok(())
}

async fn handle_execute(dir: &Path, config: &Config) -> Result<bool> {
    let store = FileStore::open(dir, &config.build.layout()).context("Failed to open project files")?;
    let orchestrator = Orchestrator::from_config(store, runtime(config, dir), config, dir)
        .context("Failed to set up orchestrator")?;

    let build_id = generate_build_id(dir);
    println!(
        "{} {} (budget {} iterations)",
        "Building:".green(),
        dir.display(),
        config.build.max_iterations
    );

    let mut ralph = RalphLoop::new(orchestrator, config.build.max_iterations, build_id)
        .with_status_file(dir.join(&config.build.status_file));

    let mut rx = ralph.subscribe();
    let watcher = tokio::spawn(async move {
        let mut last = 0;
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            let Some(current) = snapshot.current.as_ref().filter(|_| snapshot.iteration > last) else {
                continue;
            };
            last = snapshot.iteration;
            println!(
                "  [{}/{}] {} item {}: {} ({}/{} items done)",
                snapshot.iteration,
                snapshot.max_iterations,
                current.prd,
                current.item_index,
                current.task,
                snapshot.items_done,
                snapshot.items_total
            );
        }
    });

    let report = ralph.run().await.context("Build loop failed")?;
    drop(ralph);
    let _ = watcher.await;

    print_report(&report);
    Ok(report.is_completed())
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", "Iteration history:".bold());
    for record in &report.history {
        let verdict = match &record.verdict {
            Verdict::Approved { .. } => "approved".green(),
            Verdict::Denied { .. } => "denied".red(),
        };
        println!(
            "  {:>3}  {:<24} {:<8} {:<16} {}",
            record.iteration,
            record.item.to_string(),
            verdict,
            record.identity.to_string(),
            record.task
        );
        if let Verdict::Denied { reason } = &record.verdict {
            println!("       {}", reason.lines().next().unwrap_or("").dimmed());
        }
    }
    println!();

    let status = match &report.status {
        RunStatus::Completed => report.status.to_string().green(),
        RunStatus::Failed(_) => report.status.to_string().red(),
        RunStatus::Running => report.status.to_string().yellow(),
    };
    println!(
        "{} {} after {}/{} iterations, {}/{} items done",
        "Build".bold(),
        status,
        report.iterations,
        report.max_iterations,
        report.items_done,
        report.items_total
    );
    if let Some(signal) = report.completion_signal {
        println!("{}", signal);
    }
}

fn handle_status(dir: &Path, config: &Config) -> Result<()> {
    let path = dir.join(&config.build.status_file);
    match StatusSnapshot::read(&path).context("Failed to read status file")? {
        None => println!("{}", "No build has run in this project yet".yellow()),
        Some(s) => {
            println!("{} {}", "Build:".green(), s.build_id);
            println!("  status:     {}", s.status);
            if let Some(failure) = &s.failure {
                println!("  failure:    {}", failure.to_string().red());
            }
            println!("  iteration:  {}/{}", s.iteration, s.max_iterations);
            println!("  items:      {}/{}", s.items_done, s.items_total);
            println!("  denials:    {}", s.denial_streak);
            if let Some(current) = &s.current {
                println!("  current:    {} item {}: {}", current.prd, current.item_index, current.task);
            }
            if let Some(verdict) = s.last_verdict {
                println!("  verdict:    {}", verdict);
            }
            println!("  updated:    {}", s.updated_at.to_rfc3339());
        }
    }
    Ok(())
}

fn handle_prds(dir: &Path, config: &Config) -> Result<()> {
    let store = FileStore::new(dir, &config.build.layout());
    let prds = store.prds().context("Failed to read PRDs")?;
    let log = store.progress().context("Failed to read progress log")?;

    for prd in prds.prds() {
        let line = format!(
            "{:<28} {:>2}/{:<2} {}",
            prd.reference.to_string(),
            prd.done_count(),
            prd.items.len(),
            prd.title
        );
        if prd.is_complete() {
            println!("{}", line.green());
        } else {
            println!("{}", line);
        }
    }

    let (done, total) = prds.counts();
    println!("\n{} {}/{} items done", "Total:".bold(), done, total);
    match select_next(&prds, &log) {
        Some(sel) => {
            let why = match sel.reason {
                SelectionReason::AddressDenial => " (addressing denial)",
                SelectionReason::NextOpen => "",
            };
            let task = prds.item(&sel.item).map(|(_, i)| i.text.as_str()).unwrap_or("");
            println!("{} {}: {}{}", "Next:".cyan(), sel.item, task, why.yellow());
        }
        None => println!("{}", "All items done".green()),
    }
    Ok(())
}

fn handle_progress(dir: &Path, config: &Config) -> Result<()> {
    let store = FileStore::new(dir, &config.build.layout());
    let log = store.progress().context("Failed to read progress log")?;
    if log.is_empty() {
        println!("{}", "No iterations recorded yet".yellow());
    } else {
        print!("{}", log.to_text());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    let ok = run_application(&cli, config).await.context("Application failed")?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
