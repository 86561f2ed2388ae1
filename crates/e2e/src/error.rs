//! Error types for visual-regression runs

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    /// The driver went away before the runner finished
    #[error(
        "✘ {binary} failed with code: {}\nCheck that port {port} is free and that there are no other instances of {binary} running. (`killall {binary}`)",
        display_code(.code)
    )]
    DriverExited {
        binary: String,
        port: u16,
        code: Option<i32>,
    },

    #[error("Failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Driver did not report readiness within {0:?}")]
    ReadinessTimeout(Duration),

    #[error("Runner did not finish within {0:?}")]
    RunnerTimeout(Duration),

    #[error("Fixture server failed: {0:#}")]
    Server(anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

pub type RunResult<T> = Result<T, RunError>;
