//! Progress display for repository and index operations
//!
//! Draws to stderr through indicatif; a disabled reporter (quiet or JSON
//! mode) does nothing.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

/// Progress reporter for long-running phases
pub struct Progress {
    /// Whether progress display is enabled
    enabled: bool,
    /// Current progress bar
    bar: Option<ProgressBar>,
}

impl Progress {
    /// Create a new progress reporter
    pub fn new(enabled: bool) -> Self {
        Self { enabled, bar: None }
    }

    /// Create a disabled progress reporter
    pub fn disabled() -> Self {
        Self::new(false)
    }

    /// Reporter for interactive runs: off for JSON or quiet output and
    /// when stderr is not a terminal
    pub fn for_terminal(quiet: bool, json: bool) -> Self {
        Self::new(!quiet && !json && std::io::stderr().is_terminal())
    }

    /// Whether anything will be drawn
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Show a spinner while waiting on an operation of unknown length
    pub fn spinner(&mut self, message: &str) {
        if !self.enabled {
            return;
        }

        let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.cyan} {msg}")
                .expect("Invalid template"),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        self.bar = Some(spinner);
    }

    /// Start a bar counting repositories
    pub fn start(&mut self, total: u64, message: &str) {
        if !self.enabled || total == 0 {
            return;
        }

        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} {prefix} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid template")
                .progress_chars("█▓▒░"),
        );
        bar.set_prefix(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(bar);
    }

    /// Increment progress by one
    pub fn inc(&self) {
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    /// Update the message
    pub fn set_message(&self, message: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Show the step a package has reached
    pub fn step(&self, package: &str, step: &str) {
        self.set_message(&format!("{}: {}", package, step));
    }

    /// Finish and clear the current progress bar
    pub fn finish_and_clear(&mut self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
        self.bar = None;
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(true)
    }
}
