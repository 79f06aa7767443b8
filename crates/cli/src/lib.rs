pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "reimburse",
    about = "Reimburse operator CLI",
    long_about = "Operate the expense approval service: migrations, demo data, config inspection, and policy review.",
    after_help = "Examples:\n  reimburse migrate\n  reimburse seed\n  reimburse rules --company acme"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo organisation and verify it")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "List a company's approval rules in flow order")]
    Rules {
        #[arg(long, help = "Company identifier")]
        company: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Rules { company } => commands::rules::run(&company),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
