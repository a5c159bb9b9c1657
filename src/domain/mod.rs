//! Core domain models for distup
//!
//! This module contains the fundamental types used throughout the application:
//! - Structured version tuples and their comparison rules
//! - Managed packages, categories and resolution strategies
//! - Change plans produced by the planner and consumed by the orchestrator

mod package;
mod plan;
mod version;

pub use package::{Category, Package, ResolveStrategy};
pub use plan::{ChangeKind, PackageChange, Plan};
pub use version::{ParseVersionError, VersionTuple};
