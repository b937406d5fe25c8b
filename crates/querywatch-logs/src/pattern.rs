/// Separator between the include and exclude parts of a pattern spec
const EXCLUDE_SEPARATOR: char = '!';

/// Include/exclude substring rule selecting relevant log lines
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    /// Original pattern spec (used as the expectation join key)
    spec: String,

    /// Substring a line must contain
    include: String,

    /// Substring a line must not contain (empty = no exclusion)
    exclude: String,
}

impl Pattern {
    /// Parse an `include!exclude` spec, splitting once on the first `!`
    pub fn parse(spec: &str) -> Self {
        let (include, exclude) = match spec.split_once(EXCLUDE_SEPARATOR) {
            Some((include, exclude)) => (include, exclude),
            None => (spec, ""),
        };

        Self {
            spec: spec.to_string(),
            include: include.to_string(),
            exclude: exclude.to_string(),
        }
    }

    /// Parse a list of specs, preserving order
    pub fn parse_all<S: AsRef<str>>(specs: &[S]) -> Vec<Self> {
        specs.iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    /// Check if a log line qualifies under this pattern
    pub fn matches(&self, line: &str) -> bool {
        line.contains(&self.include) && !(!self.exclude.is_empty() && line.contains(&self.exclude))
    }

    /// Get the original spec
    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn include(&self) -> &str {
        &self.include
    }

    pub fn exclude(&self) -> &str {
        &self.exclude
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.spec)
    }
}

/// Find the first pattern (in list order) matching the line
///
/// Only the first match is reported even when several patterns would match.
pub fn match_any<'a>(patterns: &'a [Pattern], line: &str) -> Option<&'a Pattern> {
    patterns.iter().find(|p| p.matches(line))
}
