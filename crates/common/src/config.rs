//! visreg configuration
//!
//! Loaded from `visreg.toml`. Every section and field has a default, so a
//! missing file or a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisregConfig {
    /// Fixture web server
    pub webserver: WebserverConfig,

    /// Browser automation driver (phantomjs in webdriver mode)
    pub driver: DriverConfig,

    /// Visual diff runner (gemini)
    pub runner: RunnerConfig,

    /// Output markers used to read driver and runner state
    pub markers: MarkerConfig,
}

/// Fixture web server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebserverConfig {
    /// Bind host
    pub host: String,

    /// Bind port (0 = pick a free port)
    pub port: u16,

    /// Directory served at `/`
    pub root: PathBuf,

    /// URL prefix of dynamically rendered test pages
    pub dynamic_prefix: String,

    /// Directory holding `<name>.test` files and the page template
    pub dynamic_dir: PathBuf,

    /// Template file name inside `dynamic_dir`
    pub template: String,

    /// Reload open pages when files under `root` change
    pub livereload: bool,

    /// Render an index for directories without `index.html`
    pub directory_listing: bool,

    /// Open the base URL in the system browser once bound
    pub open: bool,
}

impl Default for WebserverConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            root: PathBuf::from("."),
            dynamic_prefix: "/test/gemini/tests/dynamic/".to_string(),
            dynamic_dir: PathBuf::from("test/gemini/tests/dynamic"),
            template: "dynamic.tmpl.html".to_string(),
            livereload: false,
            directory_listing: false,
            open: false,
        }
    }
}

impl WebserverConfig {
    /// Path of the dynamic page template
    pub fn template_path(&self) -> PathBuf {
        self.dynamic_dir.join(&self.template)
    }

    /// Path of the per-test settings file for `name`
    pub fn test_config_path(&self, name: &str) -> PathBuf {
        self.dynamic_dir.join(format!("{}.test", name))
    }
}

/// Browser automation driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Driver executable
    pub binary: String,

    /// Webdriver port passed as `--webdriver=<port>`
    pub port: u16,

    /// Extra arguments appended after the webdriver flag
    pub args: Vec<String>,

    /// Seconds to wait for the readiness marker (0 = wait forever)
    pub startup_timeout_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            binary: "phantomjs".to_string(),
            port: 4444,
            args: Vec::new(),
            startup_timeout_secs: 60,
        }
    }
}

impl DriverConfig {
    pub fn startup_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.startup_timeout_secs)
    }
}

/// Visual diff runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Runner executable
    pub binary: String,

    /// Default test suite path
    pub tests: PathBuf,

    /// Directory the runner writes its HTML report into
    pub reports_dir: PathBuf,

    /// Extra arguments appended after mode and suite
    pub args: Vec<String>,

    /// Seconds to wait for the runner to exit (0 = wait forever)
    pub timeout_secs: u64,

    /// Write `visreg-summary.json` into `reports_dir` after each run
    pub write_summary: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            binary: "gemini".to_string(),
            tests: PathBuf::from("test/gemini/tests"),
            reports_dir: PathBuf::from("test/gemini/reports"),
            args: Vec::new(),
            timeout_secs: 1800,
            write_summary: true,
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        non_zero_secs(self.timeout_secs)
    }

    /// Entry page of the diff report
    pub fn report_index(&self) -> PathBuf {
        self.reports_dir.join("index.html")
    }
}

/// Markers recognised in driver and runner output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Substring of a driver stdout line signalling readiness
    pub ready: String,

    /// Prefix of a passing runner line
    pub pass: String,

    /// Prefix of a failing runner line
    pub fail: String,

    /// Runner stderr lines containing any of these are dropped
    pub ignored_stderr: Vec<String>,

    /// Accept `visreg/1 <verb>` marker lines
    pub structured: bool,

    /// Accept the legacy substrings above
    pub legacy: bool,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            ready: "running on port".to_string(),
            pass: "✓".to_string(),
            fail: "✘".to_string(),
            ignored_stderr: vec!["DeprecationWarning:".to_string()],
            structured: true,
            legacy: true,
        }
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl VisregConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject combinations the server and orchestrator cannot work with
    pub fn validate(&self) -> Result<()> {
        let prefix = &self.webserver.dynamic_prefix;
        if !prefix.starts_with('/') || !prefix.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "webserver.dynamic_prefix must start and end with '/': {:?}",
                prefix
            )));
        }

        let markers = &self.markers;
        if !markers.legacy && !markers.structured {
            return Err(ConfigError::Invalid(
                "markers: at least one of legacy or structured must be enabled".to_string(),
            ));
        }
        if markers.legacy
            && (markers.ready.is_empty() || markers.pass.is_empty() || markers.fail.is_empty())
        {
            return Err(ConfigError::Invalid(
                "markers: ready, pass and fail must be non-empty when legacy markers are on"
                    .to_string(),
            ));
        }
        if markers.ignored_stderr.iter().any(|ignored| ignored.is_empty()) {
            return Err(ConfigError::Invalid(
                "markers.ignored_stderr must not contain empty entries".to_string(),
            ));
        }

        Ok(())
    }
}
