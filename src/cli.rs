use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::model;

/// Transactional file organization engine.
#[derive(Parser)]
#[command(name = "tidytx", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Clone, Default)]
pub struct GlobalArgs {
    /// Path to a JSON config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the ledger location.
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print JSON Schema for plan files.
    Schema,
    /// Execute a plan of moves and renames.
    Apply(ApplyArgs),
    /// Move files to the trash directory.
    Delete(DeleteArgs),
    /// Undo a committed transaction.
    Undo(UndoArgs),
    /// List recorded transactions.
    History(HistoryArgs),
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Path to plan JSON file.
    #[arg(long, required = true)]
    pub plan: PathBuf,

    /// Report what would happen without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Output structured JSON to stdout.
    #[arg(long)]
    pub json: bool,

    /// Override conflict strategy.
    #[arg(long)]
    pub strategy: Option<model::ConflictStrategy>,

    /// Override worker count.
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Fail moves whose target directory does not exist.
    #[arg(long)]
    pub no_create_dirs: bool,

    /// Keep the extension given in rename targets.
    #[arg(long)]
    pub no_preserve_extension: bool,

    /// Stop dispatching new operations after this long (e.g. "30s", "2m").
    #[arg(long, value_parser = humantime::parse_duration)]
    pub deadline: Option<std::time::Duration>,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Files to move to the trash.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Override the trash directory.
    #[arg(long)]
    pub trash: Option<PathBuf>,

    /// Output structured JSON to stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct UndoArgs {
    /// Transaction id, as shown by `history`.
    pub id: String,

    /// Output structured JSON to stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct HistoryArgs {
    /// Show only the most recent N transactions (0 shows all).
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Output structured JSON to stdout.
    #[arg(long)]
    pub json: bool,
}
