//! Requirement editing in a project's `pyproject.toml`
//!
//! Raises the `>=` bound of every managed requirement to the distribution's
//! minimum version, checks that its `<` bound is the distribution ceiling,
//! and points native library downloads of distribution packages at the
//! configured library version. Values are located with `toml`; the edits are
//! textual so comments and layout survive.

use crate::domain::VersionTuple;
use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use toml::Value;

/// Requirement lists that name managed packages
const REQUIREMENT_LISTS: &[&[&str]] = &[
    &["build-system", "requires"],
    &["project", "dependencies"],
    &["tool", "robotpy-build", "metadata", "install_requires"],
];

/// Name, extras, specifiers and marker of a PEP 508 requirement
static REQUIREMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(\[[^\]]*\])?([^;]*?)\s*(;.*)?$")
        .expect("Invalid requirement pattern")
});

static SPECIFIER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(~=|===|==|!=|<=|>=|<|>)\s*(\S+)\s*$").expect("Invalid specifier pattern")
});

static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^([ \t]*version[ \t]*=[ \t]*)"[^"]*""#).expect("Invalid version line pattern")
});

static INLINE_DOWNLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(maven_lib_download[ \t]*=[ \t]*\{[^}]*\bversion[ \t]*=[ \t]*)"[^"]*""#)
        .expect("Invalid inline download pattern")
});

/// What the distribution expects of every project's requirements
#[derive(Debug, Clone, Copy)]
pub struct RequirementPolicy<'a> {
    /// Lowest version a dependent may require, per package
    pub min_versions: &'a IndexMap<String, VersionTuple>,
    /// The `<` bound every managed requirement must carry
    pub max_version: &'a VersionTuple,
    /// Library version for `maven_lib_download` tables; set for distribution packages
    pub lib_version: Option<&'a str>,
}

/// One changed value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementEdit {
    /// Dotted location of the value
    pub section: String,
    pub before: String,
    pub after: String,
    /// Line for the commit message
    #[serde(skip)]
    pub summary: String,
}

/// Edits for one file and the resulting content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEdits {
    pub edits: Vec<RequirementEdit>,
    pub content: String,
}

impl ProjectEdits {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Commit message listing each distinct change once
    pub fn commit_message(&self) -> String {
        let summaries: BTreeSet<&str> = self.edits.iter().map(|e| e.summary.as_str()).collect();
        let mut message = String::from("Updated dependencies\n");
        for summary in summaries {
            message.push_str("\n- ");
            message.push_str(summary);
        }
        message
    }
}

/// Canonical package name: lowercase with runs of `-_.` as `-`
fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            separator = true;
        } else {
            if separator && !out.is_empty() {
                out.push('-');
            }
            separator = false;
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

fn lookup<'v>(value: &'v Value, path: &[&str]) -> Option<&'v Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

/// New text for one requirement, or None when it already satisfies the policy
fn update_requirement(
    requirement: &str,
    min_version: &VersionTuple,
    max_version: &VersionTuple,
) -> Result<Option<String>, String> {
    let caps = REQUIREMENT_PATTERN
        .captures(requirement)
        .ok_or_else(|| format!("cannot parse requirement '{}'", requirement))?;
    let Some(specs) = caps.get(3) else {
        return Err(format!("cannot parse requirement '{}'", requirement));
    };

    let mut has_min = false;
    let mut has_max = false;
    let mut changed = false;
    let mut pieces = Vec::new();
    for piece in specs.as_str().split(',') {
        let Some(spec) = SPECIFIER_PATTERN.captures(piece) else {
            pieces.push(piece.to_string());
            continue;
        };
        let parse = |raw: &str| -> Result<VersionTuple, String> {
            raw.parse()
                .map_err(|e| format!("{}: bad version '{}': {}", requirement, raw, e))
        };
        match &spec[1] {
            ">=" => {
                has_min = true;
                if parse(&spec[2])?.cmp_padded(min_version) == Ordering::Less {
                    changed = true;
                    let indent = &piece[..piece.len() - piece.trim_start().len()];
                    pieces.push(format!("{}>={}", indent, min_version));
                    continue;
                }
            }
            "<" => {
                has_max = true;
                let ceiling = parse(&spec[2])?;
                if !ceiling.same_release(max_version) {
                    return Err(format!(
                        "{}: ceiling {} differs from max_version {}",
                        requirement, ceiling, max_version
                    ));
                }
            }
            _ => {}
        }
        pieces.push(piece.to_string());
    }

    if !has_min || !has_max {
        return Err(format!(
            "{}: managed requirements need both a >= and a < bound",
            requirement
        ));
    }
    if !changed {
        return Ok(None);
    }
    let mut updated = String::with_capacity(requirement.len());
    updated.push_str(&requirement[..specs.start()]);
    updated.push_str(&pieces.join(","));
    updated.push_str(&requirement[specs.end()..]);
    Ok(Some(updated))
}

/// Replace the first quoted TOML string holding `before`
fn replace_string(content: &str, before: &str, after: &str) -> Result<String, String> {
    for quote in ['"', '\''] {
        let needle = format!("{q}{before}{q}", q = quote);
        if content.contains(&needle) {
            return Ok(content.replacen(&needle, &format!("{q}{after}{q}", q = quote), 1));
        }
    }
    Err(format!("cannot locate '{}' in the file text", before))
}

/// Point every `maven_lib_download` version at `lib_version`
fn rewrite_lib_versions(content: &str, lib_version: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_download = false;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_download = trimmed
                .trim_end_matches(']')
                .trim_end_matches(['"', '\''])
                .ends_with("maven_lib_download");
            out.push_str(line);
            continue;
        }
        let replace = |caps: &Captures| format!("{}\"{}\"", &caps[1], lib_version);
        let line = if in_download {
            VERSION_LINE.replace(line, replace)
        } else {
            INLINE_DOWNLOAD.replace(line, replace)
        };
        out.push_str(&line);
    }
    out
}

/// Wrapper names whose library download is not at `lib_version`
fn stale_downloads(doc: &Value, lib_version: &str) -> Vec<(String, String)> {
    let Some(wrappers) = lookup(doc, &["tool", "robotpy-build", "wrappers"]).and_then(Value::as_table)
    else {
        return Vec::new();
    };
    wrappers
        .iter()
        .filter_map(|(name, wrapper)| {
            let current = lookup(wrapper, &["maven_lib_download", "version"])?.as_str()?;
            (current != lib_version).then(|| (name.clone(), current.to_string()))
        })
        .collect()
}

/// Compute the edits the policy requires and the rewritten content
pub fn update_requirements(content: &str, policy: &RequirementPolicy<'_>) -> Result<ProjectEdits, String> {
    let doc: Value = content
        .parse::<toml::Table>()
        .map(Value::Table)
        .map_err(|e| e.to_string())?;

    let managed: IndexMap<String, &VersionTuple> = policy
        .min_versions
        .iter()
        .map(|(name, version)| (normalize(name), version))
        .collect();

    let mut edits = Vec::new();
    let mut updated = content.to_string();

    for path in REQUIREMENT_LISTS {
        let Some(list) = lookup(&doc, path).and_then(Value::as_array) else {
            continue;
        };
        let section = path.join(".");
        for requirement in list.iter().filter_map(Value::as_str) {
            let Some(name) = REQUIREMENT_PATTERN.captures(requirement).map(|c| normalize(&c[1]))
            else {
                continue;
            };
            let Some(min_version) = managed.get(&name) else {
                continue;
            };
            if let Some(after) = update_requirement(requirement, min_version, policy.max_version)? {
                updated = replace_string(&updated, requirement, &after)?;
                edits.push(RequirementEdit {
                    section: section.clone(),
                    before: requirement.to_string(),
                    after,
                    summary: format!("{} >= {}", name, min_version),
                });
            }
        }
    }

    if let Some(lib_version) = policy.lib_version {
        let stale = stale_downloads(&doc, lib_version);
        if !stale.is_empty() {
            updated = rewrite_lib_versions(&updated, lib_version);
            let check: Value = updated
                .parse::<toml::Table>()
                .map(Value::Table)
                .map_err(|e| e.to_string())?;
            if let Some((name, _)) = stale_downloads(&check, lib_version).first() {
                return Err(format!(
                    "cannot rewrite the maven_lib_download version of wrapper '{}'",
                    name
                ));
            }
            for (name, before) in stale {
                edits.push(RequirementEdit {
                    section: format!("wrappers.{}.maven_lib_download.version", name),
                    before,
                    after: lib_version.to_string(),
                    summary: format!("lib updated to {}", lib_version),
                });
            }
        }
    }

    Ok(ProjectEdits {
        edits,
        content: updated,
    })
}
