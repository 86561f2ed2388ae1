//! visreg CLI
//!
//! Command implementations behind the `visreg` binary.

pub mod commands;
