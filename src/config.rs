//! Configuration for phasegate.
//!
//! Settings are read from `.phasegate/phasegate.toml` and layered
//! file → environment → CLI:
//!
//! ```toml
//! [pipeline]
//! phases_file = "phases.json"
//! report_file = "veritas-report.json"
//! reapproval = "last-write-wins"
//!
//! [launcher]
//! start_cmd = "./scripts/start-phase.sh"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! Relative paths in the file resolve against `.phasegate/`; relative paths
//! from the environment or the CLI resolve against the project directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::sequencer::ReapprovalPolicy;

/// The name of the phasegate directory inside a project.
pub const PHASEGATE_DIR: &str = ".phasegate";
/// The configuration file inside [`PHASEGATE_DIR`].
pub const CONFIG_FILE: &str = "phasegate.toml";

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_phases_file")]
    pub phases_file: String,
    #[serde(default = "default_report_file")]
    pub report_file: String,
    #[serde(default)]
    pub reapproval: ReapprovalPolicy,
}

fn default_phases_file() -> String {
    "phases.json".to_string()
}

fn default_report_file() -> String {
    "veritas-report.json".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            phases_file: default_phases_file(),
            report_file: default_report_file(),
            reapproval: ReapprovalPolicy::default(),
        }
    }
}

/// `[launcher]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LauncherSection {
    /// Shell command run to start a phase (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_cmd: Option<String>,
}

/// `[logging]` section. `level` filters the log file; the console defaults to warn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// The on-disk `phasegate.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhasegateToml {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub launcher: LauncherSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl PhasegateToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse phasegate.toml")
    }

    /// Load `<phasegate_dir>/phasegate.toml`, or defaults when it does not exist.
    pub fn load_or_default(phasegate_dir: &Path) -> Result<Self> {
        let config_path = phasegate_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize phasegate.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Warnings about suspicious but loadable settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.pipeline.phases_file.trim().is_empty() {
            warnings.push("pipeline.phases_file is empty; the default chain will be used".into());
        }
        if self.pipeline.report_file.trim().is_empty() {
            warnings.push(
                "pipeline.report_file is empty; every gate check will report a missing report"
                    .into(),
            );
        }
        if let Some(cmd) = &self.launcher.start_cmd
            && cmd.trim().is_empty()
        {
            warnings.push("launcher.start_cmd is set but empty".into());
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            warnings.push(format!(
                "logging.level '{}' is not a valid filter directive",
                self.logging.level
            ));
        }
        warnings
    }
}

/// Overrides supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub report_file: Option<PathBuf>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub project_dir: PathBuf,
    pub phasegate_dir: PathBuf,
    pub phases_file: PathBuf,
    pub report_file: PathBuf,
    pub state_dir: PathBuf,
    pub inputs_dir: PathBuf,
    pub log_dir: PathBuf,
    pub start_cmd: Option<String>,
    pub reapproval: ReapprovalPolicy,
    pub log_level: String,
    pub log_json: bool,
}

impl PipelineConfig {
    /// Resolve configuration for `project_dir` from file, process environment, and CLI.
    pub fn new(project_dir: &Path, overrides: &CliOverrides) -> Result<Self> {
        Self::resolve(project_dir, overrides, |key| std::env::var(key).ok())
    }

    /// Resolve configuration with an explicit environment lookup.
    pub fn resolve<F>(project_dir: &Path, overrides: &CliOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let phasegate_dir = project_dir.join(PHASEGATE_DIR);
        let file = PhasegateToml::load_or_default(&phasegate_dir)?;

        let phases_file = phasegate_dir.join(&file.pipeline.phases_file);

        let mut report_file = phasegate_dir.join(&file.pipeline.report_file);
        if let Some(path) = env("PHASEGATE_REPORT_FILE") {
            report_file = project_dir.join(path);
        }
        if let Some(path) = &overrides.report_file {
            report_file = project_dir.join(path);
        }

        let mut start_cmd = file.launcher.start_cmd.clone();
        if let Some(cmd) = env("PHASEGATE_START_CMD") {
            start_cmd = Some(cmd);
        }
        let start_cmd = start_cmd.filter(|cmd| !cmd.trim().is_empty());

        let reapproval = match env("PHASEGATE_REAPPROVAL") {
            Some(value) => value
                .parse::<ReapprovalPolicy>()
                .context("Invalid PHASEGATE_REAPPROVAL environment variable")?,
            None => file.pipeline.reapproval,
        };

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            state_dir: phasegate_dir.join("state"),
            inputs_dir: phasegate_dir.join("inputs"),
            log_dir: phasegate_dir.join("logs"),
            phasegate_dir,
            phases_file,
            report_file,
            start_cmd,
            reapproval,
            log_level: file.logging.level,
            log_json: file.logging.json,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.phasegate_dir.join(CONFIG_FILE)
    }

    pub fn is_initialized(&self) -> bool {
        self.phasegate_dir.is_dir()
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir).context("Failed to create state directory")?;
        std::fs::create_dir_all(&self.inputs_dir).context("Failed to create inputs directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}
