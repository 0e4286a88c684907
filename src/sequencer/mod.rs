//! Phase sequencer: approval-driven advancement along the phase chain.
//!
//! The sequencer owns the phase-output store. An approval records the
//! approved phase's output, assembles the next phase's input from recorded
//! outputs, and asks the [`PhaseLauncher`] to start it. A launch failure
//! becomes a blocked-phase notification, never an error to the approver.
//!
//! No gating happens here; callers consult the verification gate before
//! offering approval. Calls must be serialized by the caller.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::SequencerError;
use crate::phase::PhaseChain;
use crate::store::{self, PHASE_OUTPUTS_KEY, PersistenceBackend};

/// Starts and blocks phases on behalf of the sequencer.
/// Real implementation: `CommandLauncher`. Test double: `RecordingLauncher`.
#[async_trait]
pub trait PhaseLauncher: Send + Sync {
    /// Start `phase` with its assembled input. May take arbitrarily long.
    async fn start_phase(&self, phase: &str, input: &str) -> Result<()>;

    /// Record that `phase` could not be started.
    async fn block_phase(&self, phase: &str, reason: &str);
}

/// The approved artifact of a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutput {
    pub phase: String,
    pub content: String,
    pub approved_at: DateTime<Utc>,
}

/// What happens when a phase that already has an output is approved again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReapprovalPolicy {
    /// Overwrite the stored output and re-attempt the transition
    #[default]
    LastWriteWins,
    /// Refuse the approval and leave everything unchanged
    Reject,
}

impl std::fmt::Display for ReapprovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReapprovalPolicy::LastWriteWins => write!(f, "last-write-wins"),
            ReapprovalPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for ReapprovalPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "last-write-wins" => Ok(ReapprovalPolicy::LastWriteWins),
            "reject" => Ok(ReapprovalPolicy::Reject),
            _ => anyhow::bail!(
                "Invalid re-approval policy '{}'. Valid values: last-write-wins, reject",
                s
            ),
        }
    }
}

/// Result of an approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// The next phase was started
    Started { phase: String },
    /// The next phase failed to start and was reported as blocked
    Blocked { phase: String, reason: String },
    /// The approved phase was the last one
    Complete,
}

pub struct PhaseSequencer {
    chain: PhaseChain,
    outputs: BTreeMap<String, PhaseOutput>,
    backend: Arc<dyn PersistenceBackend>,
    launcher: Arc<dyn PhaseLauncher>,
    policy: ReapprovalPolicy,
}

impl PhaseSequencer {
    /// Create a sequencer, loading any persisted phase outputs.
    pub fn new(
        chain: PhaseChain,
        backend: Arc<dyn PersistenceBackend>,
        launcher: Arc<dyn PhaseLauncher>,
    ) -> Self {
        let outputs: BTreeMap<String, PhaseOutput> =
            store::load_or_default(backend.as_ref(), PHASE_OUTPUTS_KEY);
        tracing::debug!(count = outputs.len(), "phase outputs loaded");
        Self {
            chain,
            outputs,
            backend,
            launcher,
            policy: ReapprovalPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReapprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn chain(&self) -> &PhaseChain {
        &self.chain
    }

    /// Store `content` as the output of `phase`, replacing any earlier output.
    pub fn record_phase_output(&mut self, phase: &str, content: &str) {
        let output = PhaseOutput {
            phase: phase.to_string(),
            content: content.to_string(),
            approved_at: Utc::now(),
        };
        if self.outputs.insert(phase.to_string(), output).is_some() {
            tracing::info!(phase, "phase output overwritten");
        } else {
            tracing::info!(phase, "phase output recorded");
        }
        self.persist();
    }

    /// Handle an operator approval of `approved_phase`.
    ///
    /// The output is recorded before the next phase is attempted and is never
    /// rolled back. Only the re-approval policy can make this return an error.
    pub async fn on_approved(
        &mut self,
        approved_phase: &str,
        content: &str,
    ) -> Result<Transition, SequencerError> {
        if self.policy == ReapprovalPolicy::Reject && self.outputs.contains_key(approved_phase) {
            tracing::warn!(phase = approved_phase, "re-approval rejected by policy");
            return Err(SequencerError::AlreadyApproved {
                phase: approved_phase.to_string(),
            });
        }
        if !self.chain.contains(approved_phase) {
            tracing::warn!(phase = approved_phase, "approved phase is not part of the chain");
        }

        self.record_phase_output(approved_phase, content);

        let Some(next) = self.get_next_phase(approved_phase) else {
            tracing::info!(phase = approved_phase, "pipeline complete");
            return Ok(Transition::Complete);
        };

        let input = self.build_next_input(&next);
        tracing::info!(from = approved_phase, to = %next, input_chars = input.len(), "starting next phase");

        match self.launcher.start_phase(&next, &input).await {
            Ok(()) => Ok(Transition::Started { phase: next }),
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::warn!(phase = %next, reason = %reason, "phase failed to start, marking blocked");
                self.launcher.block_phase(&next, &reason).await;
                Ok(Transition::Blocked {
                    phase: next,
                    reason,
                })
            }
        }
    }

    /// Assemble the input for `phase` from the recorded outputs.
    ///
    /// With an input rule, each recorded non-empty source output becomes a
    /// labeled section, in rule order, followed by the rule's instruction.
    /// Missing sources are skipped. Without a rule, the immediately preceding
    /// phase's output is used, or a generic start instruction when there is none.
    pub fn build_next_input(&self, phase: &str) -> String {
        let Some(def) = self.chain.get(phase) else {
            return generic_start_instruction(phase, None);
        };

        let Some(rule) = &def.input else {
            return self
                .chain
                .predecessor(phase)
                .and_then(|prev| self.non_empty_output(&prev.id))
                .map(|out| out.content.clone())
                .unwrap_or_else(|| generic_start_instruction(phase, Some(&def.name)));
        };

        let mut input = String::new();
        for source in &rule.sources {
            if let Some(out) = self.non_empty_output(&source.phase) {
                input.push_str(&format!("\n\n---\n## {}\n\n{}", source.label, out.content));
            }
        }
        input.push_str("\n\n");
        input.push_str(&rule.instruction);
        input
    }

    /// The chain successor of `phase`; `None` for the last or an unknown phase.
    pub fn get_next_phase(&self, phase: &str) -> Option<String> {
        self.chain.successor(phase).map(|p| p.id.clone())
    }

    /// A copy of the recorded outputs, keyed by phase id.
    pub fn get_phase_outputs(&self) -> BTreeMap<String, PhaseOutput> {
        self.outputs.clone()
    }

    /// The latest phase in chain order that has a recorded output.
    pub fn last_approved(&self) -> Option<&str> {
        self.chain
            .phases()
            .iter()
            .rev()
            .find(|p| self.outputs.contains_key(&p.id))
            .map(|p| p.id.as_str())
    }

    /// Forget every recorded output, in memory and on disk.
    pub fn reset(&mut self) {
        self.outputs.clear();
        store::remove_best_effort(self.backend.as_ref(), PHASE_OUTPUTS_KEY);
        tracing::info!("phase outputs reset");
    }

    fn non_empty_output(&self, phase: &str) -> Option<&PhaseOutput> {
        self.outputs
            .get(phase)
            .filter(|out| !out.content.trim().is_empty())
    }

    // Best-effort: a failed write loses cross-session continuity, nothing more.
    fn persist(&self) {
        store::save_best_effort(self.backend.as_ref(), PHASE_OUTPUTS_KEY, &self.outputs);
    }
}

fn generic_start_instruction(phase: &str, name: Option<&str>) -> String {
    let title = match name {
        Some(name) => format!("{} ({})", phase, name),
        None => phase.to_string(),
    };
    format!(
        "Begin phase {}. No earlier phase output is available; work from the project brief.",
        title
    )
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Launcher that records every call and optionally fails to start.
    #[derive(Default)]
    pub struct RecordingLauncher {
        pub fail_with: Option<String>,
        pub started: Mutex<Vec<(String, String)>>,
        pub blocked: Mutex<Vec<(String, String)>>,
    }

    impl RecordingLauncher {
        pub fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Self::default()
            }
        }

        pub fn started(&self) -> Vec<(String, String)> {
            self.started.lock().unwrap().clone()
        }

        pub fn blocked(&self) -> Vec<(String, String)> {
            self.blocked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PhaseLauncher for RecordingLauncher {
        async fn start_phase(&self, phase: &str, input: &str) -> Result<()> {
            self.started
                .lock()
                .unwrap()
                .push((phase.to_string(), input.to_string()));
            match &self.fail_with {
                Some(message) => anyhow::bail!("{}", message),
                None => Ok(()),
            }
        }

        async fn block_phase(&self, phase: &str, reason: &str) {
            self.blocked
                .lock()
                .unwrap()
                .push((phase.to_string(), reason.to_string()));
        }
    }
}
