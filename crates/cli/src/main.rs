//! visreg CLI - Main Entry Point
//!
//! Serves visual-regression fixtures and runs the diff runner against them.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use visreg_cli::commands::{exit_code, init, run, serve, EXIT_ERROR};
use visreg_common::{VisregConfig, DEFAULT_CONFIG_FILE};
use visreg_e2e::Mode;

/// visreg - visual regression runs against locally served fixtures
#[derive(Parser, Debug)]
#[command(name = "visreg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (missing file means defaults)
    #[arg(long, env = "VISREG_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve fixtures for development until Ctrl-C
    Serve(serve::ServeArgs),

    /// Compare screenshots against the baselines
    Test(run::RunArgs),

    /// Regenerate the baselines
    Update(run::RunArgs),

    /// Write a default configuration file
    Init(init::InitArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format!("{:#}", e).red());
            exit_code(EXIT_ERROR)
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Init(args) = cli.command {
        init::execute(args, &cli.config)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = VisregConfig::load(&cli.config)?;
    match cli.command {
        Commands::Serve(args) => serve::execute(args, config.webserver).await?,
        Commands::Test(args) => return run::execute(Mode::Test, args, config).await,
        Commands::Update(args) => return run::execute(Mode::Update, args, config).await,
        Commands::Init(_) => {}
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_commands() {
        let cli = Cli::try_parse_from(["visreg", "test", "--ci", "suites/timeline"]).unwrap();
        match cli.command {
            Commands::Test(args) => {
                assert!(args.ci);
                assert_eq!(args.suite, Some(PathBuf::from("suites/timeline")));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["visreg", "update"]).unwrap();
        assert!(matches!(cli.command, Commands::Update(ref args) if args.suite.is_none() && !args.ci));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["visreg", "serve", "--port", "0", "--config", "ci.toml", "-v"])
                .unwrap();
        assert_eq!(cli.config, PathBuf::from("ci.toml"));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Serve(ref args) if args.port == Some(0)));
    }
}
