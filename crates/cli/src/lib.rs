pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "leadflow",
    about = "Leadflow operator CLI",
    long_about = "Operate Leadflow migrations, invitation backfill, and config inspection.",
    after_help = "Examples:\n  leadflow migrate\n  leadflow backfill --limit 200 --pages 0\n  leadflow config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Replay stored invitation payloads through the reconciler, page by page"
    )]
    Backfill {
        #[arg(long, default_value_t = 0, help = "Invitation id to resume scanning after")]
        cursor: i64,
        #[arg(long, default_value_t = 100, help = "Rows scanned per page")]
        limit: u32,
        #[arg(
            long,
            default_value_t = 1,
            help = "Maximum pages to process (0 runs until the table is exhausted)"
        )]
        pages: u32,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Backfill { cursor, limit, pages } => {
            commands::backfill::run(cursor, limit, pages)
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
