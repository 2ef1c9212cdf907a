//! genguard CLI
//!
//! Operator tooling for the generation guardrails: check configuration,
//! inspect model replies, and replay outcome logs through the health monitor.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// genguard: guardrails for AI worksheet generation
#[derive(Parser)]
#[command(name = "genguard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, env = "GENGUARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a runtime configuration
    ValidateConfig {
        /// Config file (defaults to --config)
        file: Option<PathBuf>,

        /// Output format (human, json)
        #[arg(short, long, default_value = "human")]
        format: String,
    },

    /// Extract the JSON object from a saved model reply
    Extract {
        /// Reply file; reads stdin when omitted
        file: Option<PathBuf>,

        /// Require the JSON to be a worksheet item with a "type"
        #[arg(long)]
        item: bool,
    },

    /// Show when the daily quota resets
    QuotaReset {
        /// Offset of the reference timezone in minutes (defaults to config)
        #[arg(long, allow_hyphen_values = true)]
        offset_minutes: Option<i32>,
    },

    /// Replay a JSON-lines outcome log through the health monitor
    Replay {
        /// Outcome log, one event per line
        file: PathBuf,

        /// Print every decision, not only alerts
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "genguard=debug" } else { "genguard=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::ValidateConfig { file, format } => {
            commands::config::validate(file.or(cli.config), &format)
        }
        Commands::Extract { file, item } => commands::extract::run(file, item),
        Commands::QuotaReset { offset_minutes } => {
            commands::quota::reset_horizon(offset_minutes, cli.config)
        }
        Commands::Replay { file, all } => commands::replay::run(file, all, cli.config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_flag_and_env() {
        let cli = Cli::try_parse_from(["genguard", "--config", "a.yaml", "quota-reset"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("a.yaml")));

        std::env::set_var("GENGUARD_CONFIG", "from-env.yaml");
        let cli = Cli::try_parse_from(["genguard", "replay", "log.jsonl"]).unwrap();
        std::env::remove_var("GENGUARD_CONFIG");
        assert_eq!(cli.config, Some(PathBuf::from("from-env.yaml")));
        assert!(matches!(cli.command, Commands::Replay { all: false, .. }));
    }
}
