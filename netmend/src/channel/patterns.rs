//! Pattern matching utilities for prompt detection.

use memchr::memmem;
use regex::bytes::Regex;

/// Trait for prompt matching: regex, literal substring, or custom parsers.
pub trait PromptMatcher: Send + Sync {
    /// Returns byte offset where match ends, or None if no match.
    fn find_match(&self, data: &[u8]) -> Option<usize>;

    /// Check if the data matches the pattern.
    fn is_match(&self, data: &[u8]) -> bool {
        self.find_match(data).is_some()
    }

    /// Human-readable form used in logs and timeout errors.
    fn describe(&self) -> String;
}

/// Regex-based prompt matcher (the default implementation).
impl PromptMatcher for Regex {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        self.find(data).map(|m| m.end())
    }

    fn describe(&self) -> String {
        self.as_str().to_string()
    }
}

/// Literal substring matcher, e.g. `[confirm]` or `--More--`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal(pub String);

impl Literal {
    /// Create a literal matcher.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

impl PromptMatcher for Literal {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        memmem::find(data, self.0.as_bytes()).map(|pos| pos + self.0.len())
    }

    fn describe(&self) -> String {
        self.0.clone()
    }
}

/// A compiled prompt pattern with optional negative matches.
#[derive(Debug, Clone)]
pub struct CompiledPrompt {
    /// The main pattern to match.
    pattern: Regex,

    /// Substrings that must NOT be present for a match.
    not_contains: Vec<String>,
}

impl CompiledPrompt {
    /// Create a new compiled prompt from a pattern string.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            not_contains: Vec::new(),
        })
    }

    /// Create a compiled prompt with negative patterns.
    pub fn with_not_contains(pattern: &str, not_contains: Vec<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            not_contains,
        })
    }

    /// Get a reference to the underlying regex.
    pub fn regex(&self) -> &Regex {
        &self.pattern
    }

    /// Check a prompt line.
    pub fn matches(&self, prompt: &str) -> bool {
        self.is_match(prompt.as_bytes())
    }
}

impl PromptMatcher for CompiledPrompt {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        // Negative matches are checked against the line holding the match only
        self.pattern
            .find_iter(data)
            .find(|m| {
                let line_start = memchr::memrchr(b'\n', &data[..m.start()]).map_or(0, |i| i + 1);
                let line = &data[line_start..m.end()];
                !self
                    .not_contains
                    .iter()
                    .any(|nc| memmem::find(line, nc.as_bytes()).is_some())
            })
            .map(|m| m.end())
    }

    fn describe(&self) -> String {
        self.pattern.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_prompt_matcher() {
        let pattern = Regex::new(r"router#\s*$").unwrap();
        assert!(pattern.is_match(b"router# "));
        assert!(pattern.is_match(b"some output\nrouter#"));
        assert!(!pattern.is_match(b"router> "));
    }

    #[test]
    fn test_literal_matcher() {
        let confirm = Literal::new("[confirm]");
        assert_eq!(confirm.find_match(b"Erase? [confirm]"), Some(16));
        assert!(!confirm.is_match(b"Erase?"));
        assert_eq!(confirm.describe(), "[confirm]");
    }

    #[test]
    fn test_compiled_prompt_not_contains() {
        let prompt = CompiledPrompt::with_not_contains(r"#\s*$", vec!["(config".to_string()])
            .unwrap();

        assert!(prompt.matches("router#"));
        assert!(!prompt.matches("router(config)#"));
        assert!(!prompt.matches("router(config-if)#"));
        // Parentheses in earlier output do not hide the prompt
        assert!(prompt.matches("description uplink (R2)\nrouter#"));
    }
}
