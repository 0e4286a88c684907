//! Verification report model and the sources it is read from.
//!
//! Reports are produced by an external verifier; this crate only reads the
//! latest snapshot and never keeps history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tri-state verifier exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum VerifierExit {
    /// 0: every critical item is wired
    Clean,
    /// 1: one or more critical items are not wired
    CriticalMissing,
    /// 2: the verifier could not produce a trustworthy result
    VerifierFailed,
}

impl VerifierExit {
    pub fn code(self) -> i32 {
        match self {
            VerifierExit::Clean => 0,
            VerifierExit::CriticalMissing => 1,
            VerifierExit::VerifierFailed => 2,
        }
    }

    pub fn is_clean(self) -> bool {
        self == VerifierExit::Clean
    }
}

impl TryFrom<i32> for VerifierExit {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(VerifierExit::Clean),
            1 => Ok(VerifierExit::CriticalMissing),
            2 => Ok(VerifierExit::VerifierFailed),
            other => Err(format!("invalid verifier exit code {} (expected 0, 1 or 2)", other)),
        }
    }
}

impl From<VerifierExit> for i32 {
    fn from(exit: VerifierExit) -> Self {
        exit.code()
    }
}

impl std::fmt::Display for VerifierExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Snapshot of the last external verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VeritasReport {
    pub total: u32,
    pub wired: u32,
    pub not_wired: u32,
    #[serde(default)]
    pub critical_missing: Vec<String>,
    pub exit_code: VerifierExit,
    /// When the verifier produced the snapshot, if it says so
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

/// Where the latest verification report comes from.
pub trait ReportSource: Send + Sync {
    /// The most recent report, or `None` when no usable report exists.
    fn latest(&self) -> Option<VeritasReport>;
}

/// Reads the report JSON the verifier writes to disk, on every call.
pub struct FileReportSource {
    path: PathBuf,
}

impl FileReportSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl ReportSource for FileReportSource {
    fn latest(&self) -> Option<VeritasReport> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "verification report unreadable");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "verification report malformed");
                None
            }
        }
    }
}

/// A fixed report, for embedders that already hold the snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticReportSource {
    report: Option<VeritasReport>,
}

impl StaticReportSource {
    pub fn new(report: Option<VeritasReport>) -> Self {
        Self { report }
    }
}

impl ReportSource for StaticReportSource {
    fn latest(&self) -> Option<VeritasReport> {
        self.report.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const CLEAN_REPORT: &str = r#"{
        "total": 17,
        "wired": 14,
        "not_wired": 3,
        "critical_missing": [],
        "exit_code": 0
    }"#;

    #[test]
    fn test_report_parses_verifier_json() {
        let report: VeritasReport = serde_json::from_str(CLEAN_REPORT).unwrap();
        assert_eq!(report.total, 17);
        assert_eq!(report.wired, 14);
        assert_eq!(report.exit_code, VerifierExit::Clean);
        assert!(report.generated_at.is_none());
    }

    #[test]
    fn test_exit_code_serializes_as_integer() {
        let report: VeritasReport = serde_json::from_str(CLEAN_REPORT).unwrap();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["exit_code"], 0);
    }

    #[test]
    fn test_unknown_exit_code_rejected() {
        let json = CLEAN_REPORT.replace("\"exit_code\": 0", "\"exit_code\": 7");
        let result: Result<VeritasReport, _> = serde_json::from_str(&json);
        assert!(result.is_err());
    }

    #[test]
    fn test_exit_code_conversions() {
        assert_eq!(VerifierExit::try_from(1), Ok(VerifierExit::CriticalMissing));
        assert_eq!(VerifierExit::try_from(2), Ok(VerifierExit::VerifierFailed));
        assert_eq!(VerifierExit::VerifierFailed.code(), 2);
        assert!(VerifierExit::Clean.is_clean());
        assert!(!VerifierExit::CriticalMissing.is_clean());
    }

    #[test]
    fn test_file_source_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let source = FileReportSource::new(&dir.path().join("veritas-report.json"));
        assert!(source.latest().is_none());
    }

    #[test]
    fn test_file_source_malformed_file_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("veritas-report.json");
        fs::write(&path, "{ half a report").unwrap();
        assert!(FileReportSource::new(&path).latest().is_none());
    }

    #[test]
    fn test_file_source_rereads_every_call() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("veritas-report.json");
        let source = FileReportSource::new(&path);
        fs::write(&path, CLEAN_REPORT).unwrap();
        assert_eq!(source.latest().unwrap().exit_code, VerifierExit::Clean);

        let failing = CLEAN_REPORT.replace("\"exit_code\": 0", "\"exit_code\": 1");
        fs::write(&path, failing).unwrap();
        assert_eq!(
            source.latest().unwrap().exit_code,
            VerifierExit::CriticalMissing
        );
    }
}
