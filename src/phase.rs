//! Phase chain definition and JSON loading.
//!
//! This module provides:
//! - `PhaseDef`, a single stage of the pipeline together with its input rule
//! - `PhaseChain`, the validated, totally ordered sequence of phases
//! - `PhasesFile`, the `phases.json` on-disk format
//! - The built-in default chain used when no `phases.json` exists
//!
//! A chain is immutable once constructed. Every input rule is checked at
//! construction time, so a chain that loads is a chain whose input assembly
//! cannot reference an unknown or later phase.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::errors::ChainError;

/// One predecessor whose recorded output feeds a phase's input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputSource {
    /// Phase id whose output is consumed
    pub phase: String,
    /// Section heading used when the output is embedded
    pub label: String,
}

impl InputSource {
    pub fn new(phase: &str, label: &str) -> Self {
        Self {
            phase: phase.to_string(),
            label: label.to_string(),
        }
    }
}

/// Explicit input assembly rule for a phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputRule {
    /// Predecessor outputs to embed, in section order
    #[serde(default)]
    pub sources: Vec<InputSource>,
    /// Instruction appended after the embedded sections
    pub instruction: String,
}

/// A single stage of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseDef {
    /// Stage code (e.g., "01", "02")
    pub id: String,
    /// Human-readable name of the phase
    pub name: String,
    /// Input rule; `None` selects the default "previous phase output" behaviour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputRule>,
}

impl PhaseDef {
    /// Create a phase that uses the default input behaviour.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            input: None,
        }
    }

    /// Create a phase with an explicit input rule.
    pub fn with_input(id: &str, name: &str, sources: Vec<InputSource>, instruction: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            input: Some(InputRule {
                sources,
                instruction: instruction.to_string(),
            }),
        }
    }
}

/// The validated, ordered phase chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseChain {
    phases: Vec<PhaseDef>,
}

impl PhaseChain {
    /// Validate and build a chain.
    ///
    /// Rejects an empty chain, duplicate ids, and input sources that are
    /// unknown or do not strictly precede the phase consuming them.
    pub fn new(phases: Vec<PhaseDef>) -> Result<Self, ChainError> {
        if phases.is_empty() {
            return Err(ChainError::Empty);
        }

        let all: HashSet<&str> = phases.iter().map(|p| p.id.as_str()).collect();
        let mut seen: HashSet<&str> = HashSet::new();

        for phase in &phases {
            if !seen.insert(phase.id.as_str()) {
                return Err(ChainError::DuplicatePhase {
                    phase: phase.id.clone(),
                });
            }
            let Some(rule) = &phase.input else {
                continue;
            };
            for source in &rule.sources {
                if !all.contains(source.phase.as_str()) {
                    return Err(ChainError::UnknownSource {
                        phase: phase.id.clone(),
                        source_phase: source.phase.clone(),
                    });
                }
                // `seen` already holds this phase, so self-references need their own check.
                if !seen.contains(source.phase.as_str()) || source.phase == phase.id {
                    return Err(ChainError::ForwardSource {
                        phase: phase.id.clone(),
                        source_phase: source.phase.clone(),
                    });
                }
            }
        }

        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[PhaseDef] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn first(&self) -> Option<&PhaseDef> {
        self.phases.first()
    }

    pub fn get(&self, id: &str) -> Option<&PhaseDef> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Successor of `id`; `None` for the last phase and for unknown ids.
    pub fn successor(&self, id: &str) -> Option<&PhaseDef> {
        let pos = self.position(id)?;
        self.phases.get(pos + 1)
    }

    /// Predecessor of `id`; `None` for the first phase and for unknown ids.
    pub fn predecessor(&self, id: &str) -> Option<&PhaseDef> {
        let pos = self.position(id)?;
        pos.checked_sub(1).and_then(|p| self.phases.get(p))
    }
}

/// Represents the full phases.json file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasesFile {
    pub phases: Vec<PhaseDef>,
}

impl PhasesFile {
    /// Load phases from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read phases file: {}", path.display()))?;

        let phases_file: PhasesFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse phases JSON: {}", path.display()))?;

        Ok(phases_file)
    }

    /// Save phases to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize phases to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write phases file: {}", path.display()))?;

        Ok(())
    }

    /// Validate the file contents into a chain.
    pub fn into_chain(self) -> Result<PhaseChain> {
        PhaseChain::new(self.phases).context("Invalid phase chain")
    }
}

/// The built-in five-stage chain.
pub fn get_default_phases() -> Vec<PhaseDef> {
    vec![
        PhaseDef::new("01", "Requirements"),
        PhaseDef::with_input(
            "02",
            "Architecture",
            vec![InputSource::new("01", "Requirements")],
            "Design an architecture that satisfies the approved requirements above. \
             Name every component, its responsibility, and the interfaces between them.",
        ),
        PhaseDef::with_input(
            "03",
            "Implementation",
            vec![
                InputSource::new("01", "Requirements"),
                InputSource::new("02", "Architecture"),
            ],
            "Implement the architecture above. Every requirement must be traceable \
             to code; record anything left unfinished in the known-incomplete ledger.",
        ),
        PhaseDef::with_input(
            "04",
            "Verification",
            vec![
                InputSource::new("02", "Architecture"),
                InputSource::new("03", "Implementation"),
            ],
            "Verify that every critical component of the architecture is wired into \
             the implementation. Report what is missing; do not claim completion \
             while critical items remain unwired.",
        ),
        PhaseDef::new("05", "Release"),
    ]
}

/// The built-in chain, validated.
pub fn default_chain() -> PhaseChain {
    PhaseChain {
        phases: get_default_phases(),
    }
}

/// Load a chain from `phases_file`, falling back to the default chain when absent.
pub fn load_chain_or_default(phases_file: Option<&Path>) -> Result<PhaseChain> {
    match phases_file {
        Some(path) if path.exists() => PhasesFile::load(path)?.into_chain(),
        _ => Ok(default_chain()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn abc_chain() -> PhaseChain {
        PhaseChain::new(vec![
            PhaseDef::new("A", "Alpha"),
            PhaseDef::with_input("B", "Beta", vec![InputSource::new("A", "Alpha")], "Do B."),
            PhaseDef::new("C", "Gamma"),
        ])
        .unwrap()
    }

    // =========================================
    // Chain navigation
    // =========================================

    #[test]
    fn test_successor_follows_chain_order() {
        let chain = abc_chain();
        assert_eq!(chain.successor("A").map(|p| p.id.as_str()), Some("B"));
        assert_eq!(chain.successor("B").map(|p| p.id.as_str()), Some("C"));
    }

    #[test]
    fn test_successor_of_last_and_unknown_is_none() {
        let chain = abc_chain();
        assert!(chain.successor("C").is_none());
        assert!(chain.successor("Z").is_none());
    }

    #[test]
    fn test_predecessor() {
        let chain = abc_chain();
        assert!(chain.predecessor("A").is_none());
        assert_eq!(chain.predecessor("C").map(|p| p.id.as_str()), Some("B"));
        assert!(chain.predecessor("Z").is_none());
    }

    // =========================================
    // Validation
    // =========================================

    #[test]
    fn test_empty_chain_rejected() {
        assert_eq!(PhaseChain::new(vec![]), Err(ChainError::Empty));
    }

    #[test]
    fn test_duplicate_phase_rejected() {
        let result = PhaseChain::new(vec![PhaseDef::new("A", "a"), PhaseDef::new("A", "again")]);
        assert_eq!(
            result,
            Err(ChainError::DuplicatePhase {
                phase: "A".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_source_rejected() {
        let result = PhaseChain::new(vec![
            PhaseDef::new("A", "a"),
            PhaseDef::with_input("B", "b", vec![InputSource::new("Q", "Q")], "x"),
        ]);
        assert!(matches!(result, Err(ChainError::UnknownSource { .. })));
    }

    #[test]
    fn test_forward_source_rejected() {
        let result = PhaseChain::new(vec![
            PhaseDef::with_input("A", "a", vec![InputSource::new("B", "B")], "x"),
            PhaseDef::new("B", "b"),
        ]);
        assert!(matches!(result, Err(ChainError::ForwardSource { .. })));
    }

    #[test]
    fn test_self_source_rejected() {
        let result = PhaseChain::new(vec![PhaseDef::with_input(
            "A",
            "a",
            vec![InputSource::new("A", "A")],
            "x",
        )]);
        assert!(matches!(result, Err(ChainError::ForwardSource { .. })));
    }

    #[test]
    fn test_default_phases_form_a_valid_chain() {
        let chain = PhaseChain::new(get_default_phases()).unwrap();
        assert_eq!(chain, default_chain());
        assert_eq!(chain.first().map(|p| p.id.as_str()), Some("01"));
        assert_eq!(chain.len(), 5);
    }

    // =========================================
    // PhasesFile
    // =========================================

    #[test]
    fn test_phase_deserialization_without_input_rule() {
        let json = r#"{ "id": "01", "name": "Requirements" }"#;
        let phase: PhaseDef = serde_json::from_str(json).unwrap();
        assert!(phase.input.is_none());
    }

    #[test]
    fn test_phases_file_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phases.json");
        let pf = PhasesFile {
            phases: get_default_phases(),
        };
        pf.save(&path).unwrap();

        let loaded = PhasesFile::load(&path).unwrap().into_chain().unwrap();
        assert_eq!(loaded, default_chain());
    }

    #[test]
    fn test_load_invalid_chain_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phases.json");
        fs::write(
            &path,
            r#"{"phases":[{"id":"A","name":"a","input":{"sources":[{"phase":"Z","label":"Z"}],"instruction":"x"}}]}"#,
        )
        .unwrap();
        let err = load_chain_or_default(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Invalid phase chain"));
    }

    #[test]
    fn test_load_chain_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(load_chain_or_default(Some(&missing)).unwrap(), default_chain());
        assert_eq!(load_chain_or_default(None).unwrap(), default_chain());
    }

    #[test]
    fn test_load_malformed_json_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phases.json");
        fs::write(&path, "not json").unwrap();
        assert!(PhasesFile::load(&path).is_err());
    }
}
