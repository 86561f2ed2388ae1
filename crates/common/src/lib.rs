//! visreg Common Library
//!
//! Configuration and error types shared by the fixture server, the
//! orchestrator and the CLI.

pub mod config;
pub mod error;

pub use config::{DriverConfig, MarkerConfig, RunnerConfig, VisregConfig, WebserverConfig};
pub use error::{ConfigError, Result};

/// visreg version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "visreg.toml";
