//! JSON output formatter for machine processing
//!
//! This module provides:
//! - JSON serialization of plans, previews and release reports
//! - Resolution failures and repository errors as plain messages

use crate::config::ConsistencyError;
use crate::domain::{PackageChange, Plan};
use crate::orchestrator::{PreviewReport, ReleaseReport};
use crate::output::{OutputFormatter, StateResult, Verbosity};
use crate::planner::{Mode, SyncOutcome};
use crate::repo::RepoState;
use crate::requirements::{ProjectReport, RequirementsReport};
use serde::Serialize;
use std::io::Write;

/// JSON formatter for machine-readable output
pub struct JsonFormatter {
    /// Verbosity level affects detail in output
    verbosity: Verbosity,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    fn write<T: Serialize>(&self, value: &T, writer: &mut dyn Write) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, value).map_err(std::io::Error::other)?;
        writeln!(writer)
    }
}

/// JSON representation of a plan run
#[derive(Serialize)]
struct JsonPlan<'a> {
    /// Whether the configuration was written
    committed: bool,
    changes: &'a [PackageChange],
    /// Packages that could not be resolved
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<JsonFailure>,
}

/// JSON representation of a per-package error
#[derive(Serialize)]
struct JsonFailure {
    package: String,
    message: String,
}

/// JSON representation of a preview
#[derive(Serialize)]
struct JsonPreview<'a> {
    changes: &'a [PackageChange],
    actions: &'a [String],
    unreachable: &'a [String],
    blocked: &'a [String],
}

/// JSON representation of a release report
#[derive(Serialize)]
struct JsonReport<'a> {
    success: bool,
    #[serde(flatten)]
    report: &'a ReleaseReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_success: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_failure: Option<&'a str>,
}

/// JSON representation of a requirements run
#[derive(Serialize)]
struct JsonRequirements<'a> {
    committed: bool,
    projects: &'a [ProjectReport],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<JsonFailure>,
}

/// JSON representation of a working copy state
#[derive(Serialize)]
struct JsonState<'a> {
    package: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a RepoState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl OutputFormatter for JsonFormatter {
    fn format_sync(
        &self,
        outcome: &SyncOutcome,
        mode: Mode,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let failures = outcome
            .failures
            .iter()
            .map(|e| JsonFailure {
                package: e.package().to_string(),
                message: e.to_string(),
            })
            .collect();
        self.write(
            &JsonPlan {
                committed: mode == Mode::Commit && !outcome.plan.is_empty(),
                changes: &outcome.plan.changes,
                failures,
            },
            writer,
        )
    }

    fn format_plan(&self, plan: &Plan, mode: Mode, writer: &mut dyn Write) -> std::io::Result<()> {
        self.write(
            &JsonPlan {
                committed: mode == Mode::Commit && !plan.is_empty(),
                changes: &plan.changes,
                failures: Vec::new(),
            },
            writer,
        )
    }

    fn format_preview(
        &self,
        plan: &Plan,
        preview: &PreviewReport,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        self.write(
            &JsonPreview {
                changes: &plan.changes,
                actions: &preview.actions,
                unreachable: &preview.unreachable,
                blocked: &preview.blocked,
            },
            writer,
        )
    }

    fn format_report(&self, report: &ReleaseReport, writer: &mut dyn Write) -> std::io::Result<()> {
        self.write(
            &JsonReport {
                success: report.is_success(),
                report,
                last_success: report.last_success().map(|r| r.change.package.as_str()),
                first_failure: report.first_failure().map(|r| r.change.package.as_str()),
            },
            writer,
        )
    }

    fn format_states(&self, states: &[StateResult], writer: &mut dyn Write) -> std::io::Result<()> {
        let entries: Vec<JsonState> = states
            .iter()
            .map(|(name, result)| match result {
                Ok(state) => JsonState {
                    package: name,
                    state: Some(state),
                    error: None,
                },
                Err(e) => JsonState {
                    package: name,
                    state: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();
        self.write(&entries, writer)
    }

    fn format_requirements(
        &self,
        report: &RequirementsReport,
        mode: Mode,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let failures = report
            .failures
            .iter()
            .map(|e| JsonFailure {
                package: e.package().to_string(),
                message: e.to_string(),
            })
            .collect();
        self.write(
            &JsonRequirements {
                committed: mode == Mode::Commit && !report.projects.is_empty(),
                projects: &report.projects,
                failures,
            },
            writer,
        )
    }

    fn format_validation(
        &self,
        errors: &[ConsistencyError],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        if self.verbosity == Verbosity::Quiet && messages.is_empty() {
            return Ok(());
        }
        self.write(
            &serde_json::json!({
                "consistent": messages.is_empty(),
                "problems": messages,
            }),
            writer,
        )
    }
}
