//! `phasegate init`: create the project's `.phasegate/` directory.
//!
//! ```text
//! .phasegate/
//! ├── phasegate.toml        # Configuration
//! ├── phases.json           # Phase chain and input rules
//! ├── state/                # Phase outputs, ledger, blocked phases
//! ├── inputs/               # Assembled phase inputs
//! └── logs/
//! ```
//!
//! The verification report is written by the external verifier, never by init.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{CONFIG_FILE, PHASEGATE_DIR, PhasegateToml};
use crate::phase::{PhasesFile, get_default_phases};

/// Result of initializing a phasegate project.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the .phasegate directory
    pub phasegate_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

pub fn get_phasegate_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(PHASEGATE_DIR)
}

/// Initialize a phasegate project in `project_dir`.
///
/// Idempotent: existing files are never overwritten.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let phasegate_dir = get_phasegate_dir(project_dir);
    let created = !phasegate_dir.exists();

    for sub in ["state", "inputs", "logs"] {
        let dir = phasegate_dir.join(sub);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let config_file = phasegate_dir.join(CONFIG_FILE);
    if !config_file.exists() {
        PhasegateToml::default().save(&config_file)?;
    }

    let phases_file = phasegate_dir.join("phases.json");
    if !phases_file.exists() {
        PhasesFile {
            phases: get_default_phases(),
        }
        .save(&phases_file)?;
    }

    tracing::info!(dir = %phasegate_dir.display(), created, "phasegate project initialized");
    Ok(InitResult {
        phasegate_dir,
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::default_chain;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_structure() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path()).unwrap();
        assert!(result.created);
        assert!(result.phasegate_dir.is_dir());
        for sub in ["state", "inputs", "logs"] {
            assert!(result.phasegate_dir.join(sub).is_dir());
        }
        assert!(result.phasegate_dir.join("phasegate.toml").exists());

        let chain = PhasesFile::load(&result.phasegate_dir.join("phases.json"))
            .unwrap()
            .into_chain()
            .unwrap();
        assert_eq!(chain, default_chain());
    }

    #[test]
    fn test_init_is_idempotent_and_preserves_files() {
        let dir = tempdir().unwrap();
        init_project(dir.path()).unwrap();
        let config = get_phasegate_dir(dir.path()).join("phasegate.toml");
        std::fs::write(&config, "[pipeline]\nreapproval = \"reject\"\n").unwrap();

        let result = init_project(dir.path()).unwrap();
        assert!(!result.created);
        let content = std::fs::read_to_string(&config).unwrap();
        assert!(content.contains("reject"));
    }

    #[test]
    fn test_init_over_stray_file_fails() {
        let dir = tempdir().unwrap();
        std::fs::write(get_phasegate_dir(dir.path()), "not a directory").unwrap();
        assert!(init_project(dir.path()).is_err());
    }
}
