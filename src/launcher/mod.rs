//! Concrete phase launcher used by the CLI.
//!
//! Starting a phase writes its assembled input to `.phasegate/inputs/<phase>.md`
//! and, when a start command is configured, runs it through `sh -c` with the
//! phase id and input path in the environment. Blocking a phase records it in
//! the blocked-phase register; a later successful start clears the entry.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use crate::sequencer::PhaseLauncher;
use crate::store::{self, BLOCKED_PHASES_KEY, PersistenceBackend};

/// A phase that could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedPhase {
    pub phase: String,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
}

/// Persisted set of blocked phases, keyed by phase id.
#[derive(Clone)]
pub struct BlockedRegister {
    backend: Arc<dyn PersistenceBackend>,
}

impl BlockedRegister {
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self { backend }
    }

    pub fn list(&self) -> BTreeMap<String, BlockedPhase> {
        store::load_or_default(self.backend.as_ref(), BLOCKED_PHASES_KEY)
    }

    pub fn block(&self, phase: &str, reason: &str) {
        let mut blocked = self.list();
        blocked.insert(
            phase.to_string(),
            BlockedPhase {
                phase: phase.to_string(),
                reason: reason.to_string(),
                blocked_at: Utc::now(),
            },
        );
        store::save_best_effort(self.backend.as_ref(), BLOCKED_PHASES_KEY, &blocked);
    }

    pub fn clear(&self, phase: &str) {
        let mut blocked = self.list();
        if blocked.remove(phase).is_some() {
            store::save_best_effort(self.backend.as_ref(), BLOCKED_PHASES_KEY, &blocked);
        }
    }

    pub fn clear_all(&self) {
        store::remove_best_effort(self.backend.as_ref(), BLOCKED_PHASES_KEY);
    }
}

pub struct CommandLauncher {
    inputs_dir: PathBuf,
    working_dir: PathBuf,
    start_cmd: Option<String>,
    register: BlockedRegister,
}

impl CommandLauncher {
    pub fn new(
        inputs_dir: &Path,
        working_dir: &Path,
        start_cmd: Option<String>,
        register: BlockedRegister,
    ) -> Self {
        Self {
            inputs_dir: inputs_dir.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
            start_cmd,
            register,
        }
    }

    /// Path the input for `phase` is written to.
    pub fn input_path(&self, phase: &str) -> PathBuf {
        self.inputs_dir.join(format!("{}.md", file_stem(phase)))
    }

    async fn run_start_cmd(&self, cmd: &str, phase: &str, input_file: &Path) -> Result<()> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .env("PHASEGATE_PHASE", phase)
            .env("PHASEGATE_INPUT_FILE", input_file)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to spawn start command: {}", cmd))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            anyhow::bail!("Start command exited with {}: {}", code, stderr.trim());
        }
        Ok(())
    }
}

#[async_trait]
impl PhaseLauncher for CommandLauncher {
    async fn start_phase(&self, phase: &str, input: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.inputs_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create inputs directory: {}",
                    self.inputs_dir.display()
                )
            })?;
        let input_file = self.input_path(phase);
        tokio::fs::write(&input_file, input)
            .await
            .with_context(|| format!("Failed to write phase input: {}", input_file.display()))?;
        tracing::info!(phase, path = %input_file.display(), "phase input written");

        if let Some(cmd) = &self.start_cmd {
            tracing::info!(phase, cmd = %cmd, "running start command");
            self.run_start_cmd(cmd, phase, &input_file).await?;
        }

        self.register.clear(phase);
        Ok(())
    }

    async fn block_phase(&self, phase: &str, reason: &str) {
        tracing::warn!(phase, reason, "phase blocked");
        self.register.block(phase, reason);
    }
}

/// Reduce a phase id to a safe file stem.
pub fn file_stem(phase: &str) -> String {
    let stem: String = phase
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if stem.is_empty() {
        "phase".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use tempfile::tempdir;

    fn launcher_in(dir: &Path, start_cmd: Option<&str>) -> (CommandLauncher, BlockedRegister) {
        let register = BlockedRegister::new(Arc::new(MemoryBackend::new()));
        let launcher = CommandLauncher::new(
            &dir.join("inputs"),
            dir,
            start_cmd.map(str::to_string),
            register.clone(),
        );
        (launcher, register)
    }

    #[test]
    fn test_file_stem_sanitizes() {
        assert_eq!(file_stem("02"), "02");
        assert_eq!(file_stem("../etc/passwd"), "---etc-passwd");
        assert_eq!(file_stem(""), "phase");
    }

    #[tokio::test]
    async fn test_start_without_command_writes_input() {
        let dir = tempdir().unwrap();
        let (launcher, _) = launcher_in(dir.path(), None);
        launcher.start_phase("02", "assembled input").await.unwrap();
        let written = std::fs::read_to_string(dir.path().join("inputs/02.md")).unwrap();
        assert_eq!(written, "assembled input");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_command_receives_phase_and_input_path() {
        let dir = tempdir().unwrap();
        let (launcher, _) = launcher_in(
            dir.path(),
            Some("cp \"$PHASEGATE_INPUT_FILE\" \"started-$PHASEGATE_PHASE.md\""),
        );
        launcher.start_phase("03", "build it").await.unwrap();
        let copied = std::fs::read_to_string(dir.path().join("started-03.md")).unwrap();
        assert_eq!(copied, "build it");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_start_command_reports_exit_code_and_stderr() {
        let dir = tempdir().unwrap();
        let (launcher, _) = launcher_in(dir.path(), Some("echo 'no runner' >&2; exit 3"));
        let err = launcher.start_phase("03", "x").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exited with 3"));
        assert!(message.contains("no runner"));
    }

    #[tokio::test]
    async fn test_block_then_successful_start_clears_register() {
        let dir = tempdir().unwrap();
        let (launcher, register) = launcher_in(dir.path(), None);

        launcher.block_phase("02", "runner offline").await;
        let blocked = register.list();
        assert_eq!(blocked["02"].reason, "runner offline");

        launcher.start_phase("02", "retry").await.unwrap();
        assert!(register.list().is_empty());
    }

    #[test]
    fn test_register_clear_all() {
        let register = BlockedRegister::new(Arc::new(MemoryBackend::new()));
        register.block("02", "a");
        register.block("03", "b");
        assert_eq!(register.list().len(), 2);
        register.clear("02");
        assert_eq!(register.list().len(), 1);
        register.clear_all();
        assert!(register.list().is_empty());
    }
}
