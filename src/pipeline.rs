//! One pipeline instance: the sequencer, ledger, gate and auditor wired to
//! the same storage and verification report.
//!
//! Components are constructed here and handed out by reference; nothing in
//! the crate is a process-wide singleton. Dropping the `Pipeline` ends the
//! instance.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::audit::{AuditFinding, ConsistencyAuditor};
use crate::config::PipelineConfig;
use crate::errors::SequencerError;
use crate::gates::{GateResult, VerificationGate};
use crate::launcher::{BlockedRegister, CommandLauncher};
use crate::ledger::IncompletenessLedger;
use crate::phase::{PhaseChain, load_chain_or_default};
use crate::sequencer::{PhaseLauncher, PhaseSequencer, ReapprovalPolicy, Transition};
use crate::store::{FileBackend, PersistenceBackend};
use crate::verification::{FileReportSource, ReportSource};

/// Outcome of a gated approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The gate refused; nothing was recorded
    GateBlocked(GateResult),
    /// The approval went through
    Approved(Transition),
}

pub struct Pipeline {
    pub sequencer: PhaseSequencer,
    pub ledger: IncompletenessLedger,
    pub gate: VerificationGate,
    pub auditor: ConsistencyAuditor,
    pub blocked: BlockedRegister,
}

impl Pipeline {
    /// Open the pipeline described by `config`, backed by its state directory.
    pub fn open(config: &PipelineConfig) -> Result<Self> {
        let chain = load_chain_or_default(Some(&config.phases_file))
            .with_context(|| format!("Failed to load phases from {}", config.phases_file.display()))?;
        let backend: Arc<dyn PersistenceBackend> = Arc::new(FileBackend::new(&config.state_dir));
        let reports: Arc<dyn ReportSource> = Arc::new(FileReportSource::new(&config.report_file));
        let blocked = BlockedRegister::new(backend.clone());
        let launcher: Arc<dyn PhaseLauncher> = Arc::new(CommandLauncher::new(
            &config.inputs_dir,
            &config.project_dir,
            config.start_cmd.clone(),
            blocked.clone(),
        ));

        Ok(Self::assemble(
            chain,
            backend,
            reports,
            launcher,
            blocked,
            config.reapproval,
        ))
    }

    /// Wire components from explicit parts.
    pub fn assemble(
        chain: PhaseChain,
        backend: Arc<dyn PersistenceBackend>,
        reports: Arc<dyn ReportSource>,
        launcher: Arc<dyn PhaseLauncher>,
        blocked: BlockedRegister,
        policy: ReapprovalPolicy,
    ) -> Self {
        Self {
            sequencer: PhaseSequencer::new(chain, backend.clone(), launcher).with_policy(policy),
            ledger: IncompletenessLedger::open(backend),
            gate: VerificationGate::new(reports.clone()),
            auditor: ConsistencyAuditor::new(reports),
            blocked,
        }
    }

    /// Approve `phase` only if the verification gate is open.
    pub async fn approve(
        &mut self,
        phase: &str,
        content: &str,
    ) -> Result<ApprovalOutcome, SequencerError> {
        let gate = self.gate.check(phase);
        if gate.blocked {
            return Ok(ApprovalOutcome::GateBlocked(gate));
        }
        let transition = self.sequencer.on_approved(phase, content).await?;
        Ok(ApprovalOutcome::Approved(transition))
    }

    /// Audit the ledger against `exit_code`, or the latest report.
    pub fn audit(&self, exit_code: Option<i32>) -> AuditFinding {
        self.auditor.audit(&self.ledger, exit_code)
    }

    /// Start over: clear phase outputs and blocked phases. The ledger is kept.
    pub fn reset(&mut self) {
        self.sequencer.reset();
        self.blocked.clear_all();
    }
}
