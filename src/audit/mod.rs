//! Consistency auditor: cross-checks the verifier against the ledger.
//!
//! A discrepancy is the verifier reporting a non-clean state while the ledger
//! discloses no open problem. It is a standing warning for a human reviewer,
//! never an error and never remediated automatically.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ledger::IncompletenessLedger;
use crate::verification::ReportSource;

/// Result of one consistency audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFinding {
    /// Exit code the audit was evaluated against, if any was available
    pub exit_code: Option<i32>,
    pub unresolved: usize,
    pub discrepancy: bool,
    pub message: String,
    /// Ledger entries whose resolution fields contradict their state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub malformed: Vec<String>,
}

pub struct ConsistencyAuditor {
    source: Arc<dyn ReportSource>,
}

impl ConsistencyAuditor {
    pub fn new(source: Arc<dyn ReportSource>) -> Self {
        Self { source }
    }

    /// Audit `ledger` against `exit_code`, or against the latest report when
    /// no exit code is supplied.
    ///
    /// Without either there is nothing to cross-check and no discrepancy.
    pub fn audit(&self, ledger: &IncompletenessLedger, exit_code: Option<i32>) -> AuditFinding {
        let exit_code = exit_code.or_else(|| self.source.latest().map(|r| r.exit_code.code()));
        let unresolved = ledger.unresolved_count();
        let malformed = ledger.malformed_ids();

        let Some(code) = exit_code else {
            return AuditFinding {
                exit_code: None,
                unresolved,
                discrepancy: false,
                message: with_malformed_note(
                    "No verification report available; nothing to cross-check".to_string(),
                    &malformed,
                ),
                malformed,
            };
        };

        let discrepancy = !ledger.validate_consistency(code);
        let message = if discrepancy {
            tracing::warn!(
                exit_code = code,
                "discrepancy: verifier reports failure but no known-incomplete item is open"
            );
            format!(
                "DISCREPANCY: verifier exit code {} but the known-incomplete ledger has no open items",
                code
            )
        } else if code == 0 {
            format!("Verifier clean; {} open known-incomplete item(s)", unresolved)
        } else {
            format!(
                "Verifier exit code {} disclosed by {} open known-incomplete item(s)",
                code, unresolved
            )
        };

        AuditFinding {
            exit_code: Some(code),
            unresolved,
            discrepancy,
            message: with_malformed_note(message, &malformed),
            malformed,
        }
    }
}

fn with_malformed_note(message: String, malformed: &[String]) -> String {
    if malformed.is_empty() {
        message
    } else {
        format!(
            "{} ({} malformed ledger entr{}: {})",
            message,
            malformed.len(),
            if malformed.len() == 1 { "y" } else { "ies" },
            malformed.join(", ")
        )
    }
}
