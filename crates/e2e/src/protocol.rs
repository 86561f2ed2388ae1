//! Reading driver and runner state from their output lines
//!
//! Two recognisers are supported and may be enabled together:
//!
//! - legacy: the readiness substring and pass/fail prefixes the tools print
//!   on their own (`running on port`, `✓`, `✘`)
//! - structured: versioned marker lines
//!
//! ```text
//! marker-line = "visreg/1" SP verb [SP text]
//! verb        = "ready" | "pass" | "fail" | "info"
//! ```

use visreg_common::MarkerConfig;

/// Tag that opens every structured marker line
pub const PROTOCOL_TAG: &str = "visreg/1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Pass,
    Fail,
    Info,
}

/// A classified runner stdout line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerLine<'a> {
    pub class: LineClass,
    /// Text to log (the payload for structured lines)
    pub text: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Ready,
    Pass,
    Fail,
    Info,
}

/// Parse a `visreg/1 <verb> [text]` line
fn parse_structured(line: &str) -> Option<(Verb, &str)> {
    let rest = line.strip_prefix(PROTOCOL_TAG)?.strip_prefix(' ')?;
    let (verb, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let verb = match verb {
        "ready" => Verb::Ready,
        "pass" => Verb::Pass,
        "fail" => Verb::Fail,
        "info" => Verb::Info,
        _ => return None,
    };
    Some((verb, text))
}

/// Marker recognition configured from [`MarkerConfig`]
#[derive(Debug, Clone)]
pub struct MarkerProtocol {
    config: MarkerConfig,
}

impl MarkerProtocol {
    pub fn new(config: MarkerConfig) -> Self {
        Self { config }
    }

    /// Whether a driver stdout line signals readiness
    pub fn is_ready(&self, line: &str) -> bool {
        let line = line.trim_end();
        if self.config.structured && matches!(parse_structured(line), Some((Verb::Ready, _))) {
            return true;
        }
        self.config.legacy && line.contains(self.config.ready.as_str())
    }

    /// Classify a runner stdout line
    pub fn classify_stdout<'a>(&self, line: &'a str) -> RunnerLine<'a> {
        let line = line.trim_end();

        if self.config.structured {
            if let Some((verb, text)) = parse_structured(line) {
                let class = match verb {
                    Verb::Pass => LineClass::Pass,
                    Verb::Fail => LineClass::Fail,
                    Verb::Info | Verb::Ready => LineClass::Info,
                };
                return RunnerLine { class, text };
            }
        }

        let class = if !self.config.legacy {
            LineClass::Info
        } else if line.starts_with(self.config.pass.as_str()) {
            LineClass::Pass
        } else if line.starts_with(self.config.fail.as_str()) {
            LineClass::Fail
        } else {
            LineClass::Info
        };
        RunnerLine { class, text: line }
    }

    /// Classify a runner stderr line
    ///
    /// Returns the text to report as an error, or `None` for lines holding
    /// an ignored substring (deprecation notices).
    pub fn classify_stderr<'a>(&self, line: &'a str) -> Option<&'a str> {
        let line = line.trim_end();
        if self
            .config
            .ignored_stderr
            .iter()
            .any(|ignored| line.contains(ignored.as_str()))
        {
            return None;
        }
        Some(line)
    }
}

impl Default for MarkerProtocol {
    fn default() -> Self {
        Self::new(MarkerConfig::default())
    }
}
