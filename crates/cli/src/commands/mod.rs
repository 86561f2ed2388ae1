//! CLI Commands

pub mod init;
pub mod run;
pub mod serve;

use std::process::ExitCode;

/// Exit code for a completed run with reported test failures
pub const EXIT_TEST_FAILURE: u8 = 1;

/// Exit code for infrastructure and configuration errors
pub const EXIT_ERROR: u8 = 2;

pub fn exit_code(code: u8) -> ExitCode {
    ExitCode::from(code)
}
