//! Drives one visual-regression run: fixture server, driver, runner

use crate::error::{RunError, RunResult};
use crate::fixture::{FixtureHost, FixtureServer, WebFixtureHost};
use crate::process::{CommandSpec, ProcessEvent, ProcessHandle, ProcessLauncher, Stream, TokioLauncher};
use crate::protocol::{LineClass, MarkerProtocol};
use crate::report::{ReportViewer, SystemBrowser};
use crate::state::{Phase, RunState, Verdict};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use visreg_common::{DriverConfig, MarkerConfig, RunnerConfig, VisregConfig};

/// File name of the run summary inside the reports directory
pub const SUMMARY_FILE: &str = "visreg-summary.json";

/// How long to wait for a process to go away after asking it to
const EXIT_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Regenerate baselines
    Update,
    /// Compare against baselines
    Test,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Update => "update",
            Mode::Test => "test",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    ReportedFailure,
}

/// Result of a completed run
pub struct RunReport<S> {
    pub mode: Mode,
    pub suite: PathBuf,
    pub outcome: Outcome,
    pub passed: usize,
    pub failed: usize,
    pub stderr_errors: usize,
    /// Report that was opened, on failure
    pub report: Option<PathBuf>,
    /// Fixture server left running for inspection, on failure
    pub server: Option<S>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl<S> RunReport<S> {
    pub fn has_failures(&self) -> bool {
        self.outcome == Outcome::ReportedFailure
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            mode: self.mode,
            suite: self.suite.clone(),
            outcome: self.outcome,
            passed: self.passed,
            failed: self.failed,
            stderr_errors: self.stderr_errors,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: (self.finished_at - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        }
    }
}

impl<S> fmt::Debug for RunReport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunReport")
            .field("mode", &self.mode)
            .field("suite", &self.suite)
            .field("outcome", &self.outcome)
            .field("passed", &self.passed)
            .field("failed", &self.failed)
            .field("stderr_errors", &self.stderr_errors)
            .field("report", &self.report)
            .field("server_running", &self.server.is_some())
            .finish()
    }
}

/// Persisted summary of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: Mode,
    pub suite: PathBuf,
    pub outcome: Outcome,
    pub passed: usize,
    pub failed: usize,
    pub stderr_errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Orchestrator settings
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub driver: DriverConfig,
    pub runner: RunnerConfig,
    pub markers: MarkerConfig,
}

impl From<&VisregConfig> for OrchestratorConfig {
    fn from(config: &VisregConfig) -> Self {
        Self {
            driver: config.driver.clone(),
            runner: config.runner.clone(),
            markers: config.markers.clone(),
        }
    }
}

pub struct Orchestrator<H, L, V> {
    config: OrchestratorConfig,
    protocol: MarkerProtocol,
    host: H,
    launcher: L,
    viewer: V,
}

impl Orchestrator<WebFixtureHost, TokioLauncher, SystemBrowser> {
    /// Real server, real processes, system browser
    pub fn from_config(config: &VisregConfig) -> Self {
        Self::new(
            config.into(),
            WebFixtureHost::new(config.webserver.clone()),
            TokioLauncher::default(),
            SystemBrowser,
        )
    }
}

impl<H, L, V> Orchestrator<H, L, V>
where
    H: FixtureHost,
    L: ProcessLauncher,
    V: ReportViewer,
{
    pub fn new(config: OrchestratorConfig, host: H, launcher: L, viewer: V) -> Self {
        let protocol = MarkerProtocol::new(config.markers.clone());
        Self {
            config,
            protocol,
            host,
            launcher,
            viewer,
        }
    }

    /// Swap the report viewer
    pub fn with_viewer<W: ReportViewer>(self, viewer: W) -> Orchestrator<H, L, W> {
        Orchestrator {
            config: self.config,
            protocol: self.protocol,
            host: self.host,
            launcher: self.launcher,
            viewer,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn driver_command(&self) -> CommandSpec {
        let driver = &self.config.driver;
        CommandSpec::new(driver.binary.clone(), driver.binary.clone())
            .arg(format!("--webdriver={}", driver.port))
            .args(driver.args.iter().cloned())
    }

    pub fn runner_command(&self, mode: Mode, suite: &Path) -> CommandSpec {
        let runner = &self.config.runner;
        CommandSpec::new(runner.binary.clone(), runner.binary.clone())
            .arg(mode.as_str())
            .arg(suite.to_string_lossy())
            .args(runner.args.iter().cloned())
    }

    /// Run the suite once
    ///
    /// `Ok` means the runner completed: check [`RunReport::outcome`]. On a
    /// reported failure the fixture server is handed back still running.
    pub async fn run(&self, mode: Mode, suite: &Path) -> RunResult<RunReport<H::Server>> {
        let started_at = Utc::now();
        info!("Running visual regression {} of {}", mode, suite.display());

        let server = self.host.start().await?;
        info!("Serving fixtures at {}", server.base_url());

        let mut driver = match self.launcher.launch(&self.driver_command()) {
            Ok(driver) => driver,
            Err(e) => {
                server.stop();
                return Err(e);
            }
        };

        let mut state = RunState::new();
        let mut runner: Option<ProcessHandle> = None;

        let startup_timeout = self.config.driver.startup_timeout();
        let runner_timeout = self.config.runner.timeout();
        let readiness = deadline(startup_timeout);
        let completion = deadline(None);
        tokio::pin!(readiness, completion);

        // Driver events win ties so a driver exit queued alongside the
        // runner's is seen before the runner is marked complete.
        let driver_code = loop {
            tokio::select! {
                biased;

                event = driver.next_event() => match event {
                    ProcessEvent::Line { stream: Stream::Stdout, line } => {
                        if !(self.protocol.is_ready(&line) && state.driver_ready()) {
                            debug!("[{}] {}", driver.name(), line);
                            continue;
                        }
                        info!("{} is ready on port {}", driver.name(), self.config.driver.port);
                        match self.launcher.launch(&self.runner_command(mode, suite)) {
                            Ok(handle) => {
                                runner = Some(handle);
                                completion.set(deadline(runner_timeout));
                            }
                            Err(e) => {
                                self.shut_down(&mut driver, None, &server).await;
                                return Err(e);
                            }
                        }
                    }
                    ProcessEvent::Line { stream: Stream::Stderr, line } => {
                        warn!("[{}] {}", driver.name(), line);
                    }
                    ProcessEvent::Exited { code } => break code,
                },

                event = next_event(&mut runner) => match event {
                    ProcessEvent::Line { stream: Stream::Stdout, line } => {
                        self.runner_stdout(&mut state, &line);
                    }
                    ProcessEvent::Line { stream: Stream::Stderr, line } => {
                        self.runner_stderr(&mut state, &line);
                    }
                    ProcessEvent::Exited { code } => {
                        info!("Runner finished (code: {:?})", code);
                        state.runner_closed();
                        runner = None;
                        driver.terminate();
                    }
                },

                _ = &mut readiness, if state.phase() == Phase::AwaitingDriver => {
                    let limit = startup_timeout.unwrap_or_default();
                    error!("{} did not become ready within {:?}", driver.name(), limit);
                    self.shut_down(&mut driver, None, &server).await;
                    return Err(RunError::ReadinessTimeout(limit));
                }

                _ = &mut completion, if state.phase() == Phase::Running => {
                    let limit = runner_timeout.unwrap_or_default();
                    error!("Runner did not finish within {:?}", limit);
                    self.shut_down(&mut driver, runner.as_mut(), &server).await;
                    return Err(RunError::RunnerTimeout(limit));
                }
            }
        };

        let verdict = state.driver_closed();
        let finished_at = Utc::now();

        let (outcome, report, server) = match verdict {
            Verdict::InfrastructureFailure => {
                if let Some(runner) = runner.as_mut() {
                    runner.terminate();
                    runner.wait_exit(EXIT_WAIT).await;
                }
                server.stop();
                return Err(RunError::DriverExited {
                    binary: self.config.driver.binary.clone(),
                    port: self.config.driver.port,
                    code: driver_code,
                });
            }
            Verdict::ReportedFailure => {
                let report = self.config.runner.report_index();
                error!("{}", "Opening error-report in webbrowser".red());
                if let Err(e) = self.viewer.open(&report) {
                    warn!("Could not open {}: {}", report.display(), e);
                }
                info!("Fixture server left running at {}", server.base_url());
                (Outcome::ReportedFailure, Some(report), Some(server))
            }
            Verdict::Success => {
                server.stop();
                info!("{}", "Visual regression run passed".green());
                (Outcome::Success, None, None)
            }
        };

        let run = RunReport {
            mode,
            suite: suite.to_path_buf(),
            outcome,
            passed: state.passed(),
            failed: state.failed(),
            stderr_errors: state.stderr_errors(),
            report,
            server,
            started_at,
            finished_at,
        };

        if self.config.runner.write_summary {
            if let Err(e) = self.write_summary(&run.summary()) {
                warn!("Failed to write run summary: {}", e);
            }
        }

        Ok(run)
    }

    /// Write the run summary to the reports directory
    pub fn write_summary(&self, summary: &RunSummary) -> RunResult<PathBuf> {
        let dir = &self.config.runner.reports_dir;
        std::fs::create_dir_all(dir)?;

        let path = dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(&path, json)?;

        debug!("Summary written to {}", path.display());
        Ok(path)
    }

    fn runner_stdout(&self, state: &mut RunState, line: &str) {
        let line = self.protocol.classify_stdout(line);
        state.record(line.class);
        match line.class {
            LineClass::Pass => info!("{}", line.text.green()),
            LineClass::Fail => error!("{}", line.text.red()),
            LineClass::Info => info!("{}", line.text),
        }
    }

    fn runner_stderr(&self, state: &mut RunState, line: &str) {
        if let Some(text) = self.protocol.classify_stderr(line) {
            state.record_stderr_error();
            error!("{}", text.red());
        }
    }

    /// Terminate whatever is still running and stop the server
    async fn shut_down(
        &self,
        driver: &mut ProcessHandle,
        runner: Option<&mut ProcessHandle>,
        server: &H::Server,
    ) {
        if let Some(runner) = runner {
            runner.terminate();
            runner.wait_exit(EXIT_WAIT).await;
        }
        driver.terminate();
        driver.wait_exit(EXIT_WAIT).await;
        server.stop();
    }
}

async fn next_event(handle: &mut Option<ProcessHandle>) -> ProcessEvent {
    match handle {
        Some(handle) => handle.next_event().await,
        None => std::future::pending().await,
    }
}

async fn deadline(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}
