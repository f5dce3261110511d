//! Crash Reporter: produces and persists crash reports for the Supervisor.
//! See spec.md §4.D.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CrashReporterError;
use crate::process::ProcessUnit;

/// Which cohort a crashing unit belonged to, mirrored from `events::Cohort`
/// so this module has no dependency on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortKind {
    Dependency,
    Main,
    Cleanup,
}

/// What kind of failure produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashKind {
    Crash,
    CleanupFailed,
    DependencyFailed,
    MaxRetriesExceeded,
}

/// Extra detail about the triggering failure, supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    pub error_message: Option<String>,
    pub error_stack: Option<String>,
    pub retry_count: Option<u32>,
    pub cohort_kind: Option<CohortKind>,
}

/// `{ timestamp, process_id, cohort_kind, kind, error_message, error_stack?,
/// logs, status, retry_count?, context? }` from spec.md §3/§6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashReport {
    pub timestamp: String,
    pub process_id: String,
    pub cohort_kind: Option<CohortKind>,
    pub kind: CrashKind,
    pub error_message: String,
    pub error_stack: Option<String>,
    pub logs: String,
    pub status: String,
    pub retry_count: Option<u32>,
    pub context: Option<String>,
}

/// The abstract sink contract. A `CrashReporter` is invoked by the
/// Supervisor with references to the crashing `ProcessUnit`; persistence
/// beyond this contract is out of scope (spec.md §1).
pub trait CrashReporter: Send + Sync {
    fn generate_report(
        &self,
        process_id: &str,
        unit: &ProcessUnit,
        kind: CrashKind,
        context: Option<ReportContext>,
    ) -> CrashReport;

    fn save_report(&self, report: CrashReport);

    fn get_reports(&self) -> Vec<CrashReport>;

    fn clear_reports(&self);

    fn get_reports_dir(&self) -> Option<PathBuf>;
}

fn snapshot_logs(unit: &ProcessUnit) -> String {
    use crate::logger::GetLogsOptions;
    unit.logger()
        .get_logs(GetLogsOptions::default())
        .unwrap_or_else(|_| "No logs available".to_string())
}

fn build_report(
    process_id: &str,
    unit: &ProcessUnit,
    kind: CrashKind,
    context: Option<ReportContext>,
    no_logs_sentinel: &str,
    no_error_sentinel: &str,
) -> CrashReport {
    let logs = {
        let captured = snapshot_logs(unit);
        if captured.is_empty() && no_logs_sentinel != "No logs available" {
            no_logs_sentinel.to_string()
        } else {
            captured
        }
    };
    let error_message = context
        .as_ref()
        .and_then(|c| c.error_message.clone())
        .unwrap_or_else(|| no_error_sentinel.to_string());
    let error_stack = context.as_ref().and_then(|c| c.error_stack.clone());
    let retry_count = context.as_ref().and_then(|c| c.retry_count);
    let cohort_kind = context.as_ref().and_then(|c| c.cohort_kind);

    CrashReport {
        timestamp: Utc::now().to_rfc3339(),
        process_id: process_id.to_string(),
        cohort_kind,
        kind,
        error_message,
        error_stack,
        logs,
        status: unit.status().to_string(),
        retry_count,
        context: None,
    }
}

/// Filesystem-backed `CrashReporter`: writes each report as pretty-printed
/// JSON under `reports_dir`, best-effort. Write failures are logged and
/// swallowed; the report remains in the in-memory history regardless.
pub struct FsCrashReporter {
    reports_dir: PathBuf,
    history: Mutex<Vec<CrashReport>>,
}

impl FsCrashReporter {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            history: Mutex::new(Vec::new()),
        }
    }

    /// `<system-temp>/<app_name>/crash-reports`, per spec.md §4.D.
    pub fn with_default_dir(app_name: &str) -> Self {
        let dir = std::env::temp_dir().join(app_name).join("crash-reports");
        Self::new(dir)
    }

    fn report_path(&self, report: &CrashReport) -> PathBuf {
        let safe_timestamp = report.timestamp.replace([':', '.'], "-");
        self.reports_dir
            .join(format!("{safe_timestamp}_{}.json", report.process_id))
    }
}

impl CrashReporter for FsCrashReporter {
    fn generate_report(
        &self,
        process_id: &str,
        unit: &ProcessUnit,
        kind: CrashKind,
        context: Option<ReportContext>,
    ) -> CrashReport {
        build_report(
            process_id,
            unit,
            kind,
            context,
            "No logs available",
            "No error message available",
        )
    }

    fn save_report(&self, report: CrashReport) {
        let path = self.report_path(&report);
        if let Err(e) = write_report(&path, &report) {
            warn!(error = %e, path = %path.display(), "failed to persist crash report");
        }
        self.history.lock().expect("crash reporter poisoned").push(report);
    }

    fn get_reports(&self) -> Vec<CrashReport> {
        self.history.lock().expect("crash reporter poisoned").clone()
    }

    fn clear_reports(&self) {
        self.history.lock().expect("crash reporter poisoned").clear();
    }

    fn get_reports_dir(&self) -> Option<PathBuf> {
        Some(self.reports_dir.clone())
    }
}

fn write_report(path: &Path, report: &CrashReport) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)
        .map_err(CrashReporterError::Serialize)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    fs::write(path, json)
}

/// Satisfies the same contract but persists nothing, per spec.md §4.D.
#[derive(Default)]
pub struct NoopCrashReporter {
    history: Mutex<Vec<CrashReport>>,
}

impl NoopCrashReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrashReporter for NoopCrashReporter {
    fn generate_report(
        &self,
        process_id: &str,
        unit: &ProcessUnit,
        kind: CrashKind,
        context: Option<ReportContext>,
    ) -> CrashReport {
        build_report(
            process_id,
            unit,
            kind,
            context,
            "No logs available (noop)",
            "No error message available (noop)",
        )
    }

    fn save_report(&self, report: CrashReport) {
        self.history.lock().expect("crash reporter poisoned").push(report);
    }

    fn get_reports(&self) -> Vec<CrashReport> {
        self.history.lock().expect("crash reporter poisoned").clone()
    }

    fn clear_reports(&self) {
        self.history.lock().expect("crash reporter poisoned").clear();
    }

    fn get_reports_dir(&self) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LoggerConfig;
    use crate::process::ProcessUnit;

    fn test_unit() -> ProcessUnit {
        ProcessUnit::new(
            "sh",
            vec!["-c".to_string(), "echo hi".to_string()],
            Vec::new(),
            LoggerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn noop_reporter_persists_nothing_and_uses_sentinels() {
        let reporter = NoopCrashReporter::new();
        let unit = test_unit();
        let report = reporter.generate_report("main", &unit, CrashKind::Crash, None);
        assert_eq!(report.logs, "No logs available (noop)");
        assert_eq!(report.error_message, "No error message available (noop)");
        assert_eq!(reporter.get_reports_dir(), None);
        reporter.save_report(report);
        assert_eq!(reporter.get_reports().len(), 1);
        reporter.clear_reports();
        assert!(reporter.get_reports().is_empty());
    }

    #[test]
    fn fs_reporter_writes_pretty_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = FsCrashReporter::new(dir.path().to_path_buf());
        let unit = test_unit();
        let report = reporter.generate_report(
            "main",
            &unit,
            CrashKind::MaxRetriesExceeded,
            Some(ReportContext {
                error_message: Some("boom".to_string()),
                retry_count: Some(3),
                cohort_kind: Some(CohortKind::Main),
                ..Default::default()
            }),
        );
        assert_eq!(report.error_message, "boom");
        assert_eq!(report.retry_count, Some(3));
        reporter.save_report(report);

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(reporter.get_reports().len(), 1);
    }

    #[test]
    fn get_reports_returns_a_detached_snapshot() {
        let reporter = NoopCrashReporter::new();
        let unit = test_unit();
        reporter.save_report(reporter.generate_report("main", &unit, CrashKind::Crash, None));
        let mut snapshot = reporter.get_reports();
        snapshot.clear();
        assert_eq!(reporter.get_reports().len(), 1);
    }
}
