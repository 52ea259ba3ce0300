//! Response type for command execution results.

use std::time::Duration;

/// Response from a command executed over the console.
#[derive(Debug, Clone)]
pub struct Response {
    /// The command that was executed.
    pub command: String,

    /// Everything read after the command up to and including the prompt.
    pub result: String,

    /// The prompt string the read waited for.
    pub prompt: String,

    /// Time taken to execute the command.
    pub elapsed: Duration,
}

impl Response {
    /// Create a new response.
    pub fn new(
        command: impl Into<String>,
        result: impl Into<String>,
        prompt: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            result: result.into(),
            prompt: prompt.into(),
            elapsed,
        }
    }

    /// Whether the device rejected the command (`% Invalid input`, ...).
    pub fn is_rejected(&self) -> bool {
        self.result.lines().any(|l| l.trim_start().starts_with('%'))
    }

    /// Get the result lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.result.lines()
    }

    /// Check if the result contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.result.contains(pattern)
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_command() {
        let ok = Response::new("hostname R1", "\r\nR1(config)#", "(config)#", Duration::ZERO);
        assert!(!ok.is_rejected());

        let bad = Response::new(
            "hostnme R1",
            "\r\n% Invalid input detected at '^' marker.\r\nR1(config)#",
            "(config)#",
            Duration::ZERO,
        );
        assert!(bad.is_rejected());
        assert!(bad.contains("Invalid input"));
    }
}
