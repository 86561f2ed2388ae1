//! Run state machine
//!
//! ```text
//! AwaitingDriver --ready--> Running --runner closed--> Completed
//!       |                      |                          |
//!       +------ driver closed -+                          +-- driver closed
//!       v                                                 v
//! InfrastructureFailure                      Success | ReportedFailure
//! ```

use crate::protocol::LineClass;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingDriver,
    Running,
    Completed,
    Success,
    ReportedFailure,
    InfrastructureFailure,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Success | Phase::ReportedFailure | Phase::InfrastructureFailure
        )
    }
}

/// How the run ended once the driver closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    ReportedFailure,
    InfrastructureFailure,
}

impl From<Verdict> for Phase {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Success => Phase::Success,
            Verdict::ReportedFailure => Phase::ReportedFailure,
            Verdict::InfrastructureFailure => Phase::InfrastructureFailure,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunState {
    phase: Phase,
    completed: bool,
    has_error: bool,
    passed: usize,
    failed: usize,
    stderr_errors: usize,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingDriver,
            completed: false,
            has_error: false,
            passed: 0,
            failed: 0,
            stderr_errors: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the runner has closed
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Set by any failure line; never cleared
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn stderr_errors(&self) -> usize {
        self.stderr_errors
    }

    /// Record driver readiness. Returns true only for the first signal.
    pub fn driver_ready(&mut self) -> bool {
        if self.phase != Phase::AwaitingDriver {
            return false;
        }
        self.phase = Phase::Running;
        true
    }

    pub fn record(&mut self, class: LineClass) {
        match class {
            LineClass::Pass => self.passed += 1,
            LineClass::Fail => {
                self.failed += 1;
                self.has_error = true;
            }
            LineClass::Info => {}
        }
    }

    pub fn record_stderr_error(&mut self) {
        self.stderr_errors += 1;
        self.has_error = true;
    }

    /// Record the runner closing. Returns false if it was already recorded
    /// or the runner was never started.
    pub fn runner_closed(&mut self) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        self.phase = Phase::Completed;
        self.completed = true;
        true
    }

    /// Resolve the run when the driver closes
    ///
    /// Once resolved the verdict is fixed; later calls return the same one.
    pub fn driver_closed(&mut self) -> Verdict {
        let verdict = match self.phase {
            Phase::Success => Verdict::Success,
            Phase::ReportedFailure => Verdict::ReportedFailure,
            Phase::InfrastructureFailure => Verdict::InfrastructureFailure,
            _ if !self.completed => Verdict::InfrastructureFailure,
            _ if self.has_error => Verdict::ReportedFailure,
            _ => Verdict::Success,
        };
        self.phase = verdict.into();
        verdict
    }
}
