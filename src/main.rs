use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

mod cmd;

#[derive(Parser, Debug)]
#[command(name = "nightwatch")]
#[command(version, about = "Autonomous issue-fixing supervisor for GitHub repositories")]
#[command(subcommand_negates_reqs = true, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Target repository as owner/name
    #[arg(long, required = true)]
    pub repo: Option<String>,

    /// Work on this issue only instead of scanning the inbox
    #[arg(long)]
    pub issue: Option<u64>,

    /// Validate configuration and print the mission without executing it
    #[arg(long)]
    pub dry_run: bool,

    #[arg(short, long)]
    pub verbose: bool,

    /// Fan issues out over parallel workers
    #[arg(long)]
    pub parallel: bool,

    /// Worker pool size for parallel mode
    #[arg(long)]
    pub workers: Option<usize>,

    /// Directory holding `.nightwatch/` configuration (defaults to the current directory)
    #[arg(long)]
    pub project_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one role tool and print its result (called by the agent backend)
    Tool(ToolArgs),
}

#[derive(Args, Debug)]
pub struct ToolArgs {
    /// Tool name, e.g. get_file or run_tests
    pub name: String,

    /// Target repository as owner/name
    #[arg(long)]
    pub repo: String,

    /// Calling role (developer or qa); defaults to NIGHTWATCH_ROLE
    #[arg(long)]
    pub role: Option<String>,

    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub input: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Usage errors exit 1 like every other validation failure.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            e.print().context("Failed to print help")?;
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => {
            let _ = e.print();
            return Ok(ExitCode::FAILURE);
        }
    };
    dotenvy::dotenv().ok();
    nightwatch::logging::init(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    match &cli.command {
        Some(Commands::Tool(args)) => cmd::run_tool(args, &project_dir).await,
        None => cmd::run_mission(&cli, &project_dir).await,
    }
}
