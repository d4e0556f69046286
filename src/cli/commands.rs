//! CLI command definitions using clap.
//!
//! - generate-plan / generate-prds: the planning phases
//! - execute: run the Ralph loop over prds/
//! - run: all three in sequence
//! - status / prds / progress: read-only views of a project
//! - reviewer-mcp: the reviewer's verdict tools, spawned by the agent runtime

use clap::{Args, Parser, Subcommand};
use eyre::{Context, Result};
use std::path::PathBuf;
use telos::config::Config;

/// Telos - builds a project from PRD checklists with delegated, reviewed iterations
#[derive(Parser, Debug)]
#[command(name = "telos")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Project selection shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project directory
    #[arg(short = 'p', long, default_value = ".")]
    pub project_dir: PathBuf,
}

/// Overrides for a build run
#[derive(Args, Debug, Clone, Default)]
pub struct ExecuteArgs {
    /// Iteration budget
    #[arg(short = 'n', long)]
    pub max_iterations: Option<u32>,

    /// Model for implementation and review subagents
    #[arg(short, long)]
    pub model: Option<String>,

    /// Per-invocation timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

impl ExecuteArgs {
    /// Apply the overrides and re-check the result like a loaded config.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(n) = self.max_iterations {
            config.build.max_iterations = n;
        }
        if let Some(model) = &self.model {
            config.agent.model = model.clone();
        }
        if let Some(secs) = self.timeout {
            config.agent.timeout_ms = secs.saturating_mul(1000);
        }
        config.validate().context("Invalid command-line override")
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate plan.md from an interview transcript
    GeneratePlan {
        #[command(flatten)]
        project: ProjectArgs,

        /// Interview transcript file
        #[arg(long)]
        transcript: PathBuf,
    },

    /// Split plan.md into numbered PRDs under prds/
    GeneratePrds {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Run the build loop until every PRD item is approved
    Execute {
        #[command(flatten)]
        project: ProjectArgs,

        #[command(flatten)]
        args: ExecuteArgs,
    },

    /// Plan, generate PRDs, then execute
    Run {
        #[command(flatten)]
        project: ProjectArgs,

        /// Interview transcript file
        #[arg(long)]
        transcript: PathBuf,

        #[command(flatten)]
        args: ExecuteArgs,
    },

    /// Show the last published build status
    Status {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// List PRDs with item counts and the next selection
    Prds {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Print the progress log
    Progress {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Serve the reviewer's approve/deny tools over stdio (launched by the agent runtime)
    #[command(hide = true)]
    ReviewerMcp,
}
