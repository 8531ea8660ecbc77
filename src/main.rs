//! `tidytx` - transactional file organization engine.

use anyhow::Result;
use clap::Parser;
use tracing::Level;

use tidytx::cli::{Cli, Command};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);
    let exit_code = match cli.command {
        Command::Schema => {
            let schema = tidytx::model::generate_schema()?;
            println!("{}", schema);
            0
        }
        Command::Apply(args) => tidytx::engine::apply(&cli.global, args)?,
        Command::Delete(args) => tidytx::engine::delete(&cli.global, args)?,
        Command::Undo(args) => tidytx::engine::undo(&cli.global, args)?,
        Command::History(args) => tidytx::engine::history(&cli.global, args)?,
    };
    std::process::exit(exit_code);
}
