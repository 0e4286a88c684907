//! Tracing subscriber setup for the phasegate binary.
//!
//! Events go to stderr (plain or JSON) and, when a log directory is given,
//! to a daily-rolling file written on a background thread.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "PHASEGATE_LOG";

/// Console level when neither the environment nor `--verbose` says otherwise.
pub const CONSOLE_DEFAULT: &str = "warn";

/// Logging configuration for one process.
pub struct LogSettings<'a> {
    /// Level for the log file
    pub level: &'a str,
    pub json: bool,
    pub verbose: bool,
    pub log_dir: Option<&'a Path>,
}

fn env_directive(env_value: Option<String>) -> Option<String> {
    env_value.filter(|v| !v.trim().is_empty())
}

/// Console filter: explicit env value, then `--verbose`, then [`CONSOLE_DEFAULT`].
pub fn console_directive(verbose: bool, env_value: Option<String>) -> String {
    if let Some(value) = env_directive(env_value) {
        return value;
    }
    if verbose {
        "phasegate=debug".to_string()
    } else {
        CONSOLE_DEFAULT.to_string()
    }
}

/// File filter: explicit env value, then the configured level.
pub fn file_directive(level: &str, env_value: Option<String>) -> String {
    if let Some(value) = env_directive(env_value) {
        return value;
    }
    if EnvFilter::try_new(level).is_ok() {
        level.to_string()
    } else {
        "info".to_string()
    }
}

fn build_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive).with_context(|| format!("Invalid log filter '{}'", directive))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init_logging(settings: LogSettings<'_>) -> Result<Option<WorkerGuard>> {
    let env_value = std::env::var(LOG_ENV)
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok());
    let console_filter = build_filter(&console_directive(settings.verbose, env_value.clone()))?;

    let (file_layer, guard) = match settings.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let file_filter = build_filter(&file_directive(settings.level, env_value))?;
            let appender = tracing_appender::rolling::daily(dir, "phasegate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = if settings.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_defaults_to_warn() {
        assert_eq!(console_directive(false, None), "warn");
    }

    #[test]
    fn test_console_verbose_and_env() {
        assert_eq!(console_directive(true, None), "phasegate=debug");
        let directive = console_directive(true, Some("phasegate=trace".to_string()));
        assert_eq!(directive, "phasegate=trace");
    }

    #[test]
    fn test_file_keeps_configured_level() {
        assert_eq!(file_directive("info", None), "info");
        assert_eq!(file_directive("debug", Some("  ".to_string())), "debug");
    }

    #[test]
    fn test_file_env_value_wins() {
        assert_eq!(file_directive("info", Some("phasegate=trace".to_string())), "phasegate=trace");
    }

    #[test]
    fn test_invalid_level_falls_back_to_info() {
        assert_eq!(file_directive("phasegate=loud", None), "info");
    }
}
