//! Output formatting for plans, reports and repository states
//!
//! This module provides:
//! - Text output for human-readable display
//! - JSON output for machine processing

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::{ChangeLevel, TextFormatter};

use crate::config::ConsistencyError;
use crate::error::RepoError;
use crate::orchestrator::{PreviewReport, ReleaseReport};
use crate::planner::{Mode, SyncOutcome};
use crate::domain::Plan;
use crate::repo::RepoState;
use crate::requirements::RequirementsReport;
use std::io::Write;

/// Per-package result of an ensure or status run
pub type StateResult = (String, Result<RepoState, RepoError>);

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for machine processing
    Json,
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Minimal output
    Quiet,
    /// Normal output
    #[default]
    Normal,
    /// Detailed output with additional information
    Verbose,
}

/// Configuration for output formatting
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Output format (text, json)
    pub format: OutputFormat,
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Whether to use colors (when supported)
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            verbosity: Verbosity::default(),
            color: true,
        }
    }
}

impl OutputConfig {
    /// Create configuration from CLI arguments
    pub fn from_cli(json: bool, verbose: bool, quiet: bool) -> Self {
        let format = if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        };

        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };

        Self {
            format,
            verbosity,
            color: true,
        }
    }
}

/// Trait for output formatters
pub trait OutputFormatter {
    /// Sync plan and resolution failures (`updatecfg`)
    fn format_sync(&self, outcome: &SyncOutcome, mode: Mode, writer: &mut dyn Write)
        -> std::io::Result<()>;

    /// Release plan computed from maintainer targets (`update`)
    fn format_plan(&self, plan: &Plan, mode: Mode, writer: &mut dyn Write) -> std::io::Result<()>;

    /// Intended release actions (`autopush` without `--doit`)
    fn format_preview(
        &self,
        plan: &Plan,
        preview: &PreviewReport,
        writer: &mut dyn Write,
    ) -> std::io::Result<()>;

    /// Per-package outcome of a release run
    fn format_report(&self, report: &ReleaseReport, writer: &mut dyn Write)
        -> std::io::Result<()>;

    /// Working copy states (`ensure`, `status`)
    fn format_states(&self, states: &[StateResult], writer: &mut dyn Write)
        -> std::io::Result<()>;

    /// Requirement edits per project (`requirements`)
    fn format_requirements(
        &self,
        report: &RequirementsReport,
        mode: Mode,
        writer: &mut dyn Write,
    ) -> std::io::Result<()>;

    /// Consistency findings (`validate`)
    fn format_validation(
        &self,
        errors: &[ConsistencyError],
        writer: &mut dyn Write,
    ) -> std::io::Result<()>;
}

/// Create an output formatter based on configuration
pub fn create_formatter(config: OutputConfig) -> Box<dyn OutputFormatter> {
    match config.format {
        OutputFormat::Text => Box::new(TextFormatter::with_color(config.verbosity, config.color)),
        OutputFormat::Json => Box::new(JsonFormatter::new(config.verbosity)),
    }
}
