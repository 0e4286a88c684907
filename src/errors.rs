//! Typed error hierarchy for the phasegate control plane.
//!
//! Four enums cover the four places a caller may need to match on a failure:
//! - `LedgerError`: rejected ledger mutations
//! - `SequencerError`: rejected approvals
//! - `ChainError`: phase chain validation at startup
//! - `StoreError`: persistence backend failures (always swallowed by the
//!   sequencer and ledger, surfaced only to direct backend callers)
//!
//! A failed phase start has no error type here: it is reported as
//! `Transition::Blocked`, never as an error.

use thiserror::Error;

/// Errors from the incompleteness ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Cannot resolve {id}: resolution evidence must be a non-empty string")]
    EmptyEvidence { id: String },
}

/// Errors from the phase sequencer.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("Phase {phase} was already approved and re-approval is rejected by policy")]
    AlreadyApproved { phase: String },
}

/// Errors raised while validating a phase chain definition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Phase chain is empty")]
    Empty,

    #[error("Phase {phase} appears more than once in the chain")]
    DuplicatePhase { phase: String },

    #[error("Phase {phase} takes input from unknown phase {source_phase}")]
    UnknownSource { phase: String, source_phase: String },

    #[error("Phase {phase} takes input from {source_phase}, which does not precede it")]
    ForwardSource { phase: String, source_phase: String },
}

/// Errors from a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O failed for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize value for key '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stored value for key '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_error_empty_evidence_carries_id() {
        let err = LedgerError::EmptyEvidence {
            id: "KI-1".to_string(),
        };
        match &err {
            LedgerError::EmptyEvidence { id } => assert_eq!(id, "KI-1"),
        }
        assert!(err.to_string().contains("KI-1"));
    }

    #[test]
    fn sequencer_error_already_approved_names_phase() {
        let err = SequencerError::AlreadyApproved {
            phase: "02".to_string(),
        };
        assert!(err.to_string().contains("02"));
    }

    #[test]
    fn chain_error_variants_are_distinct() {
        let unknown = ChainError::UnknownSource {
            phase: "02".into(),
            source_phase: "99".into(),
        };
        let forward = ChainError::ForwardSource {
            phase: "02".into(),
            source_phase: "03".into(),
        };
        assert!(matches!(unknown, ChainError::UnknownSource { .. }));
        assert!(!matches!(forward, ChainError::UnknownSource { .. }));
        assert!(forward.to_string().contains("does not precede"));
    }

    #[test]
    fn store_error_io_carries_key_and_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = StoreError::Io {
            key: "pipeline.phase_outputs".to_string(),
            source: io_err,
        };
        match &err {
            StoreError::Io { key, source } => {
                assert_eq!(key, "pipeline.phase_outputs");
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&LedgerError::EmptyEvidence { id: "x".into() });
        assert_std_error(&SequencerError::AlreadyApproved { phase: "x".into() });
        assert_std_error(&ChainError::Empty);
        assert_std_error(&StoreError::Unavailable("down".into()));
    }
}
