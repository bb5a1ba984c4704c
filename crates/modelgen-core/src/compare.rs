//! Semantic comparison of generated sources.
//!
//! Two renderings are the same when they match line-for-line after dropping
//! generated-timestamp comment lines and normalizing whitespace. Blank lines
//! are dropped too, so a formatter adding or removing spacing does not count
//! as a change.

use regex::Regex;

use crate::diagnostic::{GeneratorError, Result};

/// Patterns for comment lines that change on every run.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    r"^\s*(//|\*|/\*)\s*Generated:",
    r"^\s*(//|\*|/\*)\s*Auto-generated.*\d{4}-\d{2}-\d{2}",
    r"^\s*(//|\*|/\*)\s*Last updated:",
    r"^\s*(//|\*|/\*)\s*Generated at\b",
];

/// Decides whether two file contents differ in anything but generated noise.
#[derive(Debug, Clone)]
pub struct SemanticComparator {
    ignore: Vec<Regex>,
}

impl Default for SemanticComparator {
    fn default() -> Self {
        Self {
            ignore: DEFAULT_IGNORE_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}

impl SemanticComparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a comparator from custom ignore patterns.
    pub fn with_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ignore = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| GeneratorError::validation(format!(
                    "invalid comparator pattern '{}': {}",
                    p.as_ref(),
                    e
                )))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ignore })
    }

    /// Adds one more ignore pattern.
    pub fn ignoring(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| GeneratorError::validation(format!("invalid comparator pattern '{}': {}", pattern, e)))?;
        self.ignore.push(regex);
        Ok(self)
    }

    pub fn identical(&self, a: &str, b: &str) -> bool {
        self.normalize(a) == self.normalize(b)
    }

    /// Normalized lines of `content`.
    pub fn normalize(&self, content: &str) -> Vec<String> {
        content
            .lines()
            .filter(|line| !self.ignore.iter().any(|re| re.is_match(line)))
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect()
    }
}
