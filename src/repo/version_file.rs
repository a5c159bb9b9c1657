//! Version-declaration file editing
//!
//! Rewrites the first `version = "..."` assignment of a TOML file in place,
//! leaving every other byte untouched.

use regex::Regex;
use std::sync::LazyLock;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^([ \t]*version[ \t]*=[ \t]*)"([^"]*)""#).expect("Invalid version pattern")
});

/// The currently declared version, if any
pub fn declared_version(content: &str) -> Option<&str> {
    VERSION_PATTERN
        .captures(content)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
}

/// Replace the declared version with `new_version`
pub fn bump_version(content: &str, new_version: &str) -> Result<String, String> {
    let caps = VERSION_PATTERN
        .captures(content)
        .ok_or_else(|| "no `version = \"...\"` assignment found".to_string())?;
    let whole = caps.get(0).ok_or_else(|| "empty match".to_string())?;
    let prefix = &caps[1];

    let mut result = String::with_capacity(content.len() + new_version.len());
    result.push_str(&content[..whole.start()]);
    result.push_str(prefix);
    result.push('"');
    result.push_str(new_version);
    result.push('"');
    result.push_str(&content[whole.end()..]);
    Ok(result)
}
