mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::lending::{AllocateArgs, PenaltyArgs, TermsArgs};
use commands::scenario::ScenarioArgs;

/// Microfinance loan accounting from the command line
#[derive(Parser)]
#[command(
    name = "loanbook",
    version,
    about = "Microfinance loan terms, repayment allocation and vault ledger scenarios",
    long_about = "A CLI for quoting loan terms and penalties, splitting repayments across \
                  penalty, interest and principal, and replaying scripted loan portfolios \
                  through a double-entry vault ledger with decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Quote interest, total due and schedule dates for a principal
    Terms(TermsArgs),
    /// Quote the late penalty for a number of days overdue
    Penalty(PenaltyArgs),
    /// Split a payment across penalty, interest and principal
    Allocate(AllocateArgs),
    /// Replay a scripted loan portfolio through the vault ledger
    Scenario(ScenarioArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match input::file::load_config(cli.config.as_deref()) {
        Ok(config) => {
            tracing::debug!(path = ?cli.config, "engine configuration loaded");
            config
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Terms(args) => commands::lending::run_terms(args, &config),
        Commands::Penalty(args) => commands::lending::run_penalty(args, &config),
        Commands::Allocate(args) => commands::lending::run_allocate(args),
        Commands::Scenario(args) => {
            // An explicit --config replaces any config block in the scenario
            let override_config = cli.config.is_some().then_some(&config);
            commands::scenario::run_scenario(args, override_config)
        }
        Commands::Version => {
            println!("loanbook {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
