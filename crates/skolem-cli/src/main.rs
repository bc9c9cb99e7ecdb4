//! Skolem CLI
//!
//! - `skolem` (or `skolem repl`): interactive session
//! - `skolem run`: the same commands from a script and/or `-e` arguments

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod repl;

use repl::OutputFormat;

#[derive(Parser)]
#[command(name = "skolem")]
#[command(
    author,
    version,
    about = "Skolem: a small logic-programming term language"
)]
struct Cli {
    /// Log filter in `tracing` env-filter syntax (default: `$SKOLEM_LOG`, else `warn`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Disable coloured output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive REPL (the default when no command is given).
    Repl,

    /// Run REPL commands non-interactively.
    ///
    /// Script lines run first, then each `-e` command in order. Blank lines
    /// and lines starting with `#` or `//` are skipped.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Script file with one command per line (`-` reads stdin).
    #[arg(long)]
    script: Option<PathBuf>,

    /// A command to run (repeatable).
    #[arg(short = 'e', long = "eval")]
    commands: Vec<String>,

    /// Report failing commands and keep going instead of stopping.
    #[arg(long)]
    continue_on_error: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Do not echo each command before its output.
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_tracing(cli.log_level.as_deref())?;

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Repl => repl::cmd_repl(),
        Commands::Run(args) => repl::cmd_run(&repl::RunOptions {
            script: args.script,
            commands: args.commands,
            continue_on_error: args.continue_on_error,
            format: args.format,
            quiet: args.quiet,
        }),
    }
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(directive) => EnvFilter::try_new(directive)
            .map_err(|e| anyhow!("invalid --log-level `{directive}`: {e}"))?,
        None => EnvFilter::try_from_env("SKOLEM_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
