//! `visreg test` and `visreg update`

use super::{exit_code, EXIT_TEST_FAILURE};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use visreg_common::VisregConfig;
use visreg_e2e::{LogOnly, Mode, Orchestrator, Outcome};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Suite directory handed to the runner (defaults to `runner.tests`)
    pub suite: Option<PathBuf>,

    /// Unattended run: never open the report, stop the server on failure
    #[arg(long)]
    pub ci: bool,
}

pub async fn execute(mode: Mode, args: RunArgs, config: VisregConfig) -> anyhow::Result<ExitCode> {
    let suite = args.suite.unwrap_or_else(|| config.runner.tests.clone());
    let orchestrator = Orchestrator::from_config(&config);

    let report = if args.ci {
        orchestrator.with_viewer(LogOnly).run(mode, &suite).await?
    } else {
        orchestrator.run(mode, &suite).await?
    };

    info!(
        "{} finished: {} passed, {} failed",
        mode,
        report.passed.to_string().green(),
        report.failed.to_string().red()
    );

    match report.outcome {
        Outcome::Success => Ok(ExitCode::SUCCESS),
        Outcome::ReportedFailure => {
            if let Some(mut server) = report.server {
                if !args.ci {
                    info!(
                        "Fixtures still served at {} for inspection, press Ctrl-C to stop",
                        server.base_url()
                    );
                    tokio::signal::ctrl_c().await?;
                }
                server.stop();
                server.stopped().await;
            }
            Ok(exit_code(EXIT_TEST_FAILURE))
        }
    }
}
