//! Human-readable rendering and persistence of an [`EvaluationReport`].

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::ReportError;
use crate::gate::Verdict;
use crate::report::EvaluationReport;

const RULE: &str = "==================================================";
const THIN_RULE: &str = "--------------------------------------------------";

/// Header row of the history log.
pub const HISTORY_HEADER: &str = "version,cqi,rqi,verdict,override_reason";

/// Render the console dashboard.
pub fn render_console(report: &EvaluationReport, app_name: &str) -> String {
    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("  RELEASE QUALITY DASHBOARD: {}\n", app_name));
    out.push_str(&format!("  Version: {}\n", report.version));
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("  CQI (development): {:.1}%\n", report.cqi()));
    out.push_str(&format!("  RQI (release):     {:.1}%\n", report.rqi()));
    out.push_str(THIN_RULE);
    out.push('\n');

    for pillar in &report.pillars {
        if pillar.skipped {
            out.push_str(&format!(
                "  - {:<18} skipped ({})\n",
                pillar.name, pillar.detail
            ));
        } else {
            let marker = if pillar.score >= report.threshold {
                "✓"
            } else {
                "✗"
            };
            out.push_str(&format!(
                "  {} {:<18} {:>5.1}%  {}\n",
                marker, pillar.name, pillar.score, pillar.detail
            ));
        }
    }

    out.push_str(THIN_RULE);
    out.push('\n');
    match report.verdict {
        Verdict::Pass => out.push_str("  STATUS: PASSED\n"),
        Verdict::Fail => out.push_str(&format!(
            "  STATUS: FAILED (RQI below {:.1}%)\n",
            report.threshold
        )),
        Verdict::Overridden => out.push_str(&format!(
            "  STATUS: PASSED BY OVERRIDE ({})\n",
            report.override_reason.as_deref().unwrap_or_default()
        )),
    }
    out.push_str(RULE);
    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Append-only CSV log with one row per run.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row; the header is written only when the file is new or empty.
    pub fn append(&self, report: &EvaluationReport) -> Result<(), ReportError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut row = String::new();
        if file.metadata()?.len() == 0 {
            row.push_str(HISTORY_HEADER);
            row.push('\n');
        }
        row.push_str(&history_row(report));
        row.push('\n');

        file.write_all(row.as_bytes())?;
        Ok(())
    }
}

/// Format one history row.
pub fn history_row(report: &EvaluationReport) -> String {
    format!(
        "{},{:.1},{:.1},{},{}",
        csv_field(&report.version),
        report.cqi(),
        report.rqi(),
        report.verdict.as_str(),
        quote(report.override_reason.as_deref().unwrap_or_default()),
    )
}

/// Append to `log`, logging instead of failing.
pub fn record_history(log: &HistoryLog, report: &EvaluationReport) {
    match log.append(report) {
        Ok(()) => info!(path = %log.path().display(), "History updated"),
        Err(e) => warn!(path = %log.path().display(), error = %e, "Failed to update history"),
    }
}

/// Write the report as pretty JSON.
pub fn write_report_json(path: &Path, report: &EvaluationReport) -> Result<(), ReportError> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        quote(value)
    } else {
        value.to_string()
    }
}
