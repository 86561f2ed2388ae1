//! Opening the HTML diff report

use std::path::Path;
use tracing::info;

/// Presents a generated report to the user
pub trait ReportViewer: Send + Sync {
    fn open(&self, report: &Path) -> std::io::Result<()>;
}

/// Opens reports with the platform's default browser
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl ReportViewer for SystemBrowser {
    fn open(&self, report: &Path) -> std::io::Result<()> {
        open::that(report)
    }
}

/// Only logs where the report is, for unattended runs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnly;

impl ReportViewer for LogOnly {
    fn open(&self, report: &Path) -> std::io::Result<()> {
        info!("Report written to {}", report.display());
        Ok(())
    }
}
