//! Eligible path patterns.
//!
//! Servlet-style mappings: `/*` (and `/`) match every path, `/prefix/*`
//! matches `/prefix` and everything below it, `*.ext` matches by extension,
//! anything else must match the path exactly.

use regex::RegexSet;

/// Compiled set of eligible path patterns.
#[derive(Debug, Clone)]
pub struct UrlPatterns {
    set: RegexSet,
}

impl UrlPatterns {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = RegexSet::new(patterns.into_iter().map(|p| to_regex(p.as_ref())))?;
        Ok(Self { set })
    }

    /// Whether `path` (without query) is eligible for interception.
    pub fn is_match(&self, path: &str) -> bool {
        self.set.is_match(path)
    }
}

fn to_regex(pattern: &str) -> String {
    if pattern == "/" || pattern == "/*" {
        return "^/.*$".into();
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return format!("^{}(/.*)?$", regex::escape(prefix));
    }
    if let Some(ext) = pattern.strip_prefix("*.") {
        return format!(r"^.*\.{}$", regex::escape(ext));
    }
    format!("^{}$", regex::escape(pattern))
}
