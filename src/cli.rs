//! CLI argument parsing module for distup

use crate::domain::VersionTuple;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parse a `NAME=VERSION` release target
fn parse_target(s: &str) -> Result<(String, VersionTuple), String> {
    let (name, version) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VERSION, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing package name in '{}'", s));
    }
    let version = version
        .trim()
        .parse::<VersionTuple>()
        .map_err(|e| e.to_string())?;
    Ok((name.to_string(), version))
}

/// Parse a timeout given in whole seconds
fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: u64 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid number of seconds: {}", s))?;
    if secs == 0 {
        return Err("timeout must be at least one second".to_string());
    }
    Ok(Duration::from_secs(secs))
}

/// Release orchestrator for a distribution of interdependent packages
#[derive(Parser, Debug, Clone)]
#[command(
    name = "distup",
    version,
    about = "Keep a package distribution's pinned versions in sync and release it in order"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file
    #[arg(long, global = true, default_value = "cfg.toml")]
    pub config: PathBuf,

    /// Directory holding working copies (default: `repos` next to the config)
    #[arg(long, global = true)]
    pub repo_dir: Option<PathBuf>,

    /// Timeout in seconds for index requests and git commands
    #[arg(long, global = true, default_value = "60", value_parser = parse_seconds)]
    pub timeout: Duration,

    /// Concurrent repository and index operations
    #[arg(long, global = true, default_value_t = crate::repo::DEFAULT_JOBS)]
    pub jobs: usize,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Enable quiet mode - minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,
}

impl GlobalArgs {
    /// Working copy root, defaulting to `repos` beside the configuration
    pub fn repo_root(&self) -> PathBuf {
        match &self.repo_dir {
            Some(dir) => dir.clone(),
            None => self
                .config
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join("repos"),
        }
    }

    /// Concurrency limit, never below one
    pub fn jobs(&self) -> usize {
        self.jobs.max(1)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Clone missing working copies and fetch existing ones
    Ensure,

    /// Show the state of each working copy without touching the network
    Status,

    /// Check the configuration for inconsistencies
    Validate,

    /// Sync pinned versions with what the index and local copies report
    #[command(name = "updatecfg")]
    UpdateCfg {
        /// Write the updated versions to the configuration
        #[arg(long)]
        doit: bool,
    },

    /// Set maintainer-chosen versions for one or more packages
    Update {
        /// Release target, e.g. --set robotpy-wpiutil=2024.1.1.0 (repeatable)
        #[arg(
            long = "set",
            value_name = "NAME=VERSION",
            required = true,
            action = ArgAction::Append,
            value_parser = parse_target
        )]
        targets: Vec<(String, VersionTuple)>,

        /// Write the new versions to the configuration
        #[arg(long)]
        commit: bool,

        /// Stop before this package in repository order
        #[arg(long, value_name = "PACKAGE")]
        until: Option<String>,
    },

    /// Commit, tag and push every package whose pin is ahead of its last release
    Autopush {
        /// Perform the release instead of previewing it
        #[arg(long)]
        doit: bool,

        /// Wait for each release to appear in the index before the next one
        #[arg(long)]
        wait: bool,

        /// Stop before this package in repository order
        #[arg(long, value_name = "PACKAGE")]
        until: Option<String>,

        /// Push retries for transient failures
        #[arg(long, default_value_t = crate::orchestrator::DEFAULT_RETRIES)]
        retries: u32,
    },

    /// Raise each project's requirements to the configured minimum versions
    Requirements {
        /// Write and commit the updated pyproject.toml files
        #[arg(long)]
        commit: bool,

        /// Stop before this package in repository order
        #[arg(long, value_name = "PACKAGE")]
        until: Option<String>,
    },
}
