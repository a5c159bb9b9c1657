//! Text output formatter for human-readable display
//!
//! This module provides:
//! - Plan display with colors and aligned package names
//! - Change level indication (upstream release vs maintainer patch)
//! - Release report with the success/failure boundary
//! - Working copy state and validation listings

use crate::config::ConsistencyError;
use crate::domain::{PackageChange, Plan, VersionTuple};
use crate::orchestrator::{PackageState, PreviewReport, ReleaseReport};
use crate::output::{OutputFormatter, StateResult, Verbosity};
use crate::planner::{Mode, SyncOutcome};
use crate::requirements::RequirementsReport;
use colored::Colorize;
use std::io::Write;

/// How far apart two versions are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeLevel {
    /// The upstream part (all but the last component) changed
    Upstream,
    /// Only the trailing maintainer component changed
    Maintainer,
    /// The version moves backward
    Downgrade,
    /// Same version, e.g. a retried publication
    Same,
}

impl ChangeLevel {
    /// Determine the change level between two versions
    pub fn from_versions(old: &VersionTuple, new: &VersionTuple) -> Self {
        match new.cmp_padded(old) {
            std::cmp::Ordering::Less => ChangeLevel::Downgrade,
            std::cmp::Ordering::Equal => ChangeLevel::Same,
            std::cmp::Ordering::Greater => {
                let width = old.len().max(new.len()).max(1);
                let head = |v: &VersionTuple| -> Vec<u64> {
                    (0..width - 1)
                        .map(|i| v.components().get(i).copied().unwrap_or(0))
                        .collect()
                };
                if head(old) == head(new) {
                    ChangeLevel::Maintainer
                } else {
                    ChangeLevel::Upstream
                }
            }
        }
    }

    /// Get the display label with color
    pub fn colored_label(&self) -> String {
        match self {
            ChangeLevel::Upstream => "upstream".yellow().bold().to_string(),
            ChangeLevel::Maintainer => "patch".green().to_string(),
            ChangeLevel::Downgrade => "downgrade".red().bold().to_string(),
            ChangeLevel::Same => "same".dimmed().to_string(),
        }
    }

    /// Get the plain label
    pub fn label(&self) -> &'static str {
        match self {
            ChangeLevel::Upstream => "upstream",
            ChangeLevel::Maintainer => "patch",
            ChangeLevel::Downgrade => "downgrade",
            ChangeLevel::Same => "same",
        }
    }
}

/// Text formatter for human-readable output
pub struct TextFormatter {
    /// Verbosity level
    verbosity: Verbosity,
    /// Whether to use colors
    color: bool,
}

impl TextFormatter {
    /// Create a new text formatter with color option
    pub fn with_color(verbosity: Verbosity, color: bool) -> Self {
        Self { verbosity, color }
    }

    fn heading(&self, text: &str, writer: &mut dyn Write) -> std::io::Result<()> {
        if self.color {
            writeln!(writer, "{}", text.bold())
        } else {
            writeln!(writer, "{}", text)
        }
    }

    fn format_problems(
        &self,
        header: &str,
        problems: &[String],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        if problems.is_empty() {
            return Ok(());
        }
        writeln!(writer)?;
        if self.color {
            writeln!(writer, "{}", header.red().bold())?;
        } else {
            writeln!(writer, "{}", header)?;
        }
        for problem in problems {
            writeln!(writer, "  {}", problem)?;
        }
        Ok(())
    }

    fn dim(&self, text: &str) -> String {
        if self.color {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    fn max_name_length<'a>(names: impl Iterator<Item = &'a str>) -> usize {
        names.map(str::len).max().unwrap_or(0).max(20)
    }

    /// Format a single change line
    fn format_change_line(
        &self,
        change: &PackageChange,
        width: usize,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let level = ChangeLevel::from_versions(&change.old_version, &change.new_version);
        let old = change.old_version.to_string();
        let new = change.new_version.to_string();

        if self.color {
            writeln!(
                writer,
                "  {:width$} {} {} {} [{}] {}",
                change.package,
                old.dimmed(),
                "→".dimmed(),
                new.bright_white().bold(),
                level.colored_label(),
                format!("({})", change.kind).dimmed(),
                width = width
            )
        } else {
            writeln!(
                writer,
                "  {:width$} {} -> {} [{}] ({})",
                change.package,
                old,
                new,
                level.label(),
                change.kind,
                width = width
            )
        }
    }

    fn format_changes(&self, plan: &Plan, writer: &mut dyn Write) -> std::io::Result<()> {
        let width = Self::max_name_length(plan.iter().map(|c| c.package.as_str()));
        for change in plan.iter() {
            self.format_change_line(change, width, writer)?;
        }
        Ok(())
    }

    fn format_mode_footer(&self, mode: Mode, flag: &str, writer: &mut dyn Write) -> std::io::Result<()> {
        match mode {
            Mode::Commit => self.heading("Configuration updated.", writer),
            Mode::Preview => {
                writeln!(writer)?;
                writeln!(
                    writer,
                    "{}",
                    self.dim(&format!("Preview only; run again with {} to apply.", flag))
                )
            }
        }
    }

    fn state_label(&self, state: PackageState) -> String {
        let label = state.to_string();
        if !self.color {
            return label;
        }
        match state {
            PackageState::Pushed => label.green().to_string(),
            PackageState::Failed => label.red().bold().to_string(),
            PackageState::Pending => label.dimmed().to_string(),
            PackageState::Ensured | PackageState::Committed => label.yellow().to_string(),
        }
    }
}

impl OutputFormatter for TextFormatter {
    fn format_sync(
        &self,
        outcome: &SyncOutcome,
        mode: Mode,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        if outcome.plan.is_empty() {
            if self.verbosity != Verbosity::Quiet {
                writeln!(writer, "All pinned versions match the resolved versions.")?;
            }
        } else {
            self.heading(
                &format!("{} pinned version(s) out of date:", outcome.plan.len()),
                writer,
            )?;
            self.format_changes(&outcome.plan, writer)?;
        }

        if !outcome.failures.is_empty() {
            writeln!(writer)?;
            let header = format!("Could not resolve {} package(s):", outcome.failures.len());
            if self.color {
                writeln!(writer, "{}", header.red().bold())?;
            } else {
                writeln!(writer, "{}", header)?;
            }
            for failure in &outcome.failures {
                writeln!(writer, "  {}", failure)?;
            }
        }

        if !outcome.plan.is_empty() {
            self.format_mode_footer(mode, "--doit", writer)?;
        }
        Ok(())
    }

    fn format_plan(&self, plan: &Plan, mode: Mode, writer: &mut dyn Write) -> std::io::Result<()> {
        if plan.is_empty() {
            if self.verbosity != Verbosity::Quiet {
                writeln!(writer, "Nothing to release.")?;
            }
            return Ok(());
        }
        self.heading(&format!("Release plan ({} package(s)):", plan.len()), writer)?;
        self.format_changes(plan, writer)?;
        self.format_mode_footer(mode, "--commit", writer)
    }

    fn format_preview(
        &self,
        plan: &Plan,
        preview: &PreviewReport,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        if plan.is_empty() {
            writeln!(writer, "Nothing to do")?;
            return Ok(());
        }
        self.heading("Would:", writer)?;
        for (index, action) in preview.actions.iter().enumerate() {
            writeln!(writer, "  {}. {}", index + 1, action)?;
        }
        self.format_problems("Unreachable repositories:", &preview.unreachable, writer)?;
        self.format_problems("Blocked releases:", &preview.blocked, writer)?;
        writeln!(writer)?;
        writeln!(
            writer,
            "{}",
            self.dim("Preview only; run again with --doit to release.")
        )
    }

    fn format_report(&self, report: &ReleaseReport, writer: &mut dyn Write) -> std::io::Result<()> {
        let width = Self::max_name_length(report.packages.iter().map(|r| r.change.package.as_str()));
        for entry in &report.packages {
            if self.verbosity == Verbosity::Quiet && entry.state != PackageState::Failed {
                continue;
            }
            write!(
                writer,
                "  {:width$} {:>10}  {}",
                entry.change.package,
                self.state_label(entry.state),
                self.dim(&format!("{} -> {}", entry.change.old_version, entry.change.new_version)),
                width = width
            )?;
            writeln!(writer)?;
            if let Some(error) = &entry.error {
                writeln!(writer, "    {}", error)?;
            }
        }

        if report.is_success() {
            if self.verbosity != Verbosity::Quiet {
                writeln!(writer)?;
                self.heading(&format!("Released {} package(s).", report.packages.len()), writer)?;
            }
            if self.verbosity == Verbosity::Verbose {
                if let Some(elapsed) = report.elapsed() {
                    writeln!(writer, "Finished in {}s", elapsed.num_seconds())?;
                }
            }
            return Ok(());
        }

        writeln!(writer)?;
        if report.cancelled {
            writeln!(writer, "Cancelled.")?;
        }
        let last = report
            .last_success()
            .map(|r| r.change.package.as_str())
            .unwrap_or("(none)");
        writeln!(writer, "Last successful package: {}", last)?;
        if let Some(failed) = report.first_failure() {
            writeln!(writer, "First failed package:    {}", failed.change.package)?;
        }
        let pending = report.not_attempted();
        if !pending.is_empty() {
            writeln!(writer, "Not attempted:           {}", pending.join(", "))?;
        }
        Ok(())
    }

    fn format_states(&self, states: &[StateResult], writer: &mut dyn Write) -> std::io::Result<()> {
        let width = Self::max_name_length(states.iter().map(|(name, _)| name.as_str()));
        for (name, result) in states {
            match result {
                Ok(state) if !state.exists => {
                    writeln!(writer, "  {:width$} {}", name, self.dim("not cloned"), width = width)?
                }
                Ok(state) => {
                    let cleanliness = if state.dirty {
                        if self.color {
                            "dirty".yellow().to_string()
                        } else {
                            "dirty".to_string()
                        }
                    } else if self.color {
                        "clean".green().to_string()
                    } else {
                        "clean".to_string()
                    };
                    writeln!(
                        writer,
                        "  {:width$} {} {} {}",
                        name,
                        state.short_revision(),
                        state.branch.as_deref().unwrap_or("(detached)"),
                        cleanliness,
                        width = width
                    )?;
                    if self.verbosity == Verbosity::Verbose {
                        for path in &state.changed {
                            writeln!(writer, "      {}", self.dim(path))?;
                        }
                    }
                }
                Err(e) => {
                    let msg = e.to_string();
                    if self.color {
                        writeln!(writer, "  {:width$} {}", name, msg.red(), width = width)?
                    } else {
                        writeln!(writer, "  {:width$} {}", name, msg, width = width)?
                    }
                }
            }
        }
        Ok(())
    }

    fn format_requirements(
        &self,
        report: &RequirementsReport,
        mode: Mode,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        if report.projects.is_empty() && self.verbosity != Verbosity::Quiet {
            writeln!(writer, "All requirements are up to date.")?;
        }
        for project in &report.projects {
            self.heading(&project.package, writer)?;
            for edit in &project.edits {
                writeln!(
                    writer,
                    "  {}: {} -> {}",
                    self.dim(&edit.section),
                    edit.before,
                    edit.after
                )?;
            }
        }

        let failures: Vec<String> = report.failures.iter().map(ToString::to_string).collect();
        self.format_problems(
            &format!("Could not update {} package(s):", failures.len()),
            &failures,
            writer,
        )?;

        if report.projects.is_empty() {
            return Ok(());
        }
        match mode {
            Mode::Commit => {
                writeln!(writer)?;
                self.heading("Changes committed locally; nothing was pushed.", writer)
            }
            Mode::Preview => {
                writeln!(writer)?;
                writeln!(
                    writer,
                    "{}",
                    self.dim("Preview only; run again with --commit to apply.")
                )
            }
        }
    }

    fn format_validation(
        &self,
        errors: &[ConsistencyError],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        if errors.is_empty() {
            if self.verbosity != Verbosity::Quiet {
                writeln!(writer, "Configuration is consistent.")?;
            }
            return Ok(());
        }
        self.heading(&format!("{} problem(s) found:", errors.len()), writer)?;
        for error in errors {
            writeln!(writer, "  - {}", error)?;
        }
        Ok(())
    }
}
