//! distup - version sync and ordered release for multi-repository distributions
//!
//! This library provides the core functionality for keeping a distribution
//! of interdependent packages consistent:
//! - Configuration model with pinned and minimum versions
//! - Version resolution against an artifact index or local working copies
//! - Sync and release planning with monotonic version changes
//! - Ordered commit, tag and push across the distribution's repositories
//! - Requirement propagation into each project's `pyproject.toml`

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod planner;
pub mod progress;
pub mod registry;
pub mod requirements;
pub mod repo;
pub mod resolver;
