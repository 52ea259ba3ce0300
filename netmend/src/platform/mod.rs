//! Prompt definitions for the supported CLI family.
//!
//! A [`PromptSet`] recognizes the three CLI modes the drivers care about and
//! is what a session uses to track whether it has reached privileged mode.

pub mod ios;

use crate::channel::CompiledPrompt;

/// CLI mode recognized from a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `Router>`
    User,
    /// `Router#`
    Privileged,
    /// `Router(config)#` and its sub-modes
    Configuration,
}

/// The prompts of one CLI family.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Family name (e.g., "cisco_ios").
    pub name: String,

    /// Non-privileged prompt.
    pub user: CompiledPrompt,

    /// Privileged prompt.
    pub privileged: CompiledPrompt,

    /// Configuration prompt, including sub-modes.
    pub configuration: CompiledPrompt,
}

impl PromptSet {
    /// Create a prompt set.
    pub fn new(
        name: impl Into<String>,
        user: CompiledPrompt,
        privileged: CompiledPrompt,
        configuration: CompiledPrompt,
    ) -> Self {
        Self {
            name: name.into(),
            user,
            privileged,
            configuration,
        }
    }

    /// Determine the mode from the last prompt line of `output`.
    ///
    /// Lines after the prompt (unsolicited syslog messages, for instance)
    /// are passed over.
    pub fn determine(&self, output: &str) -> Option<Mode> {
        output
            .lines()
            .rev()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .find_map(|line| self.mode_of(line))
    }

    /// The mode a single prompt line belongs to.
    pub fn mode_of(&self, line: &str) -> Option<Mode> {
        if self.configuration.matches(line) {
            Some(Mode::Configuration)
        } else if self.privileged.matches(line) {
            Some(Mode::Privileged)
        } else if self.user.matches(line) {
            Some(Mode::User)
        } else {
            None
        }
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        ios::prompts()
    }
}
