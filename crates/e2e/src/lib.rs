//! visreg orchestrator
//!
//! Runs a visual-regression suite against fixtures served in-process:
//! - Starts the fixture server (`visreg-web`)
//! - Spawns the browser driver and waits for it to report readiness
//! - Spawns the diff runner in `update` or `test` mode and classifies its output
//! - Stops the driver once the runner is done and decides the outcome
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Orchestrator::run(mode, suite)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FixtureHost::start() -> FixtureServer                      │
//! │  ProcessLauncher::launch(driver) -> ProcessHandle           │
//! │    └── ready marker ──> launch(runner) -> ProcessHandle     │
//! │          ├── stdout: pass / fail / info  (MarkerProtocol)   │
//! │          ├── stderr: error unless ignored                   │
//! │          └── exit ──> terminate driver                      │
//! │  driver exit ──> RunState::driver_closed()                  │
//! │    ├── InfrastructureFailure -> Err(DriverExited)           │
//! │    ├── ReportedFailure -> open report, keep server          │
//! │    └── Success -> stop server                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod fixture;
pub mod orchestrator;
pub mod process;
pub mod protocol;
pub mod report;
pub mod state;

pub use error::{RunError, RunResult};
pub use fixture::{FixtureHost, FixtureServer, WebFixtureHost};
pub use orchestrator::{Mode, Orchestrator, OrchestratorConfig, Outcome, RunReport, RunSummary};
pub use process::{CommandSpec, ProcessEvent, ProcessHandle, ProcessLauncher, Stream, TokioLauncher};
pub use protocol::{LineClass, MarkerProtocol};
pub use report::{LogOnly, ReportViewer, SystemBrowser};
pub use state::{Phase, RunState, Verdict};
