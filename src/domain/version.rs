//! Structured version tuples
//!
//! A version is an ordered sequence of non-negative integer components,
//! e.g. `2023.4.3.1` is upstream `2023.4.3` plus maintainer patch `1`.
//!
//! Ordering pads the shorter tuple with zeros. Equality is length-sensitive,
//! so `1.0` and `1.0.0` are neither equal nor ordered relative to each other.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Error returned when a version string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError {
    /// The rejected input
    pub input: String,
    /// Why it was rejected
    pub reason: String,
}

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for ParseVersionError {}

/// An ordered sequence of version components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionTuple(Vec<u64>);

impl VersionTuple {
    /// Creates a tuple from its components
    pub fn new(components: impl Into<Vec<u64>>) -> Self {
        Self(components.into())
    }

    /// Returns the components
    pub fn components(&self) -> &[u64] {
        &self.0
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty tuple
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lexicographic comparison with the shorter tuple zero-padded
    pub fn cmp_padded(&self, other: &Self) -> Ordering {
        let width = self.0.len().max(other.0.len());
        for i in 0..width {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Returns true if both tuples denote the same version after padding
    pub fn same_release(&self, other: &Self) -> bool {
        self.cmp_padded(other) == Ordering::Equal
    }

    /// Returns true if this version string starts with the given series,
    /// e.g. `2023.4.3.0` is in series `2023` and `2023.4`
    pub fn in_series(&self, series: &VersionTuple) -> bool {
        self.0.starts_with(&series.0)
    }
}

impl PartialOrd for VersionTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.cmp_padded(other) {
            Ordering::Equal if self.0.len() != other.0.len() => None,
            ordering => Some(ordering),
        }
    }
}

impl FromStr for VersionTuple {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(ParseVersionError {
                input: s.to_string(),
                reason: "empty version".to_string(),
            });
        }

        let components = trimmed
            .split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|_| ParseVersionError {
                    input: s.to_string(),
                    reason: format!("component '{}' is not a non-negative integer", part),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(components))
    }
}

impl fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", component)?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for VersionTuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionTuple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
