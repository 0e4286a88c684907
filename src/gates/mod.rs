//! Verification gate: may the operator be offered approval for a phase?
//!
//! The gate is a pure read of the latest verification report. It caches
//! nothing, so its answer always reflects the most recent verifier run.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::verification::{ReportSource, VeritasReport};

/// Outcome of a gate check. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<VeritasReport>,
    /// `"<wired>/<total>"` when the gate is open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wired: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_wired: Option<u32>,
}

impl GateResult {
    fn blocked(reason: String, details: Option<VeritasReport>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason),
            details,
            wired: None,
            not_wired: None,
        }
    }

    fn open(report: &VeritasReport) -> Self {
        Self {
            blocked: false,
            reason: None,
            details: None,
            wired: Some(format!("{}/{}", report.wired, report.total)),
            not_wired: Some(report.not_wired),
        }
    }
}

pub struct VerificationGate {
    source: Arc<dyn ReportSource>,
}

impl VerificationGate {
    pub fn new(source: Arc<dyn ReportSource>) -> Self {
        Self { source }
    }

    /// Check whether approval may be offered for `phase`.
    ///
    /// `phase` only appears in the failure message.
    pub fn check(&self, phase: &str) -> GateResult {
        let Some(report) = self.source.latest() else {
            tracing::info!(phase, "gate blocked: no verification report");
            return GateResult::blocked(
                format!(
                    "Verification report missing for phase {}: the verifier must run first",
                    phase
                ),
                None,
            );
        };

        if !report.exit_code.is_clean() {
            let missing = report.critical_missing.len();
            tracing::info!(
                phase,
                exit_code = report.exit_code.code(),
                critical_missing = missing,
                "gate blocked: verifier reports non-clean state"
            );
            return GateResult::blocked(
                format!(
                    "Phase {} blocked: {} critical item(s) not wired (verifier exit code {})",
                    phase, missing, report.exit_code
                ),
                Some(report),
            );
        }

        tracing::debug!(phase, wired = report.wired, total = report.total, "gate open");
        GateResult::open(&report)
    }
}
