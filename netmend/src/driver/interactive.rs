//! Interactive command support for handling prompts that require input.
//!
//! Many console commands stop and ask before they act:
//! - `erase startup-config` asks "Erasing the nvram filesystem ... [confirm]"
//! - `enable` may ask for a `Password:`
//! - `reload` asks whether to save the configuration, then to confirm
//!
//! [`Session::send_interactive`] handles these by sending a sequence of
//! inputs, each waiting for a specific prompt before proceeding. Every step
//! is mandatory: a prompt that never shows up is a read timeout.

use std::time::{Duration, Instant};

use log::debug;
use regex::bytes::Regex;

use crate::channel::{Literal, PromptMatcher, Session};
use crate::error::{ChannelError, Result};
use crate::transport::Transport;

/// What an interactive step waits for.
#[derive(Debug, Clone)]
pub enum Expect {
    /// A literal substring such as `[confirm]`.
    Literal(Literal),
    /// A regex, typically a device prompt.
    Regex(Regex),
}

impl PromptMatcher for Expect {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        match self {
            Expect::Literal(literal) => literal.find_match(data),
            Expect::Regex(regex) => regex.find_match(data),
        }
    }

    fn describe(&self) -> String {
        match self {
            Expect::Literal(literal) => literal.describe(),
            Expect::Regex(regex) => regex.describe(),
        }
    }
}

/// An event in an interactive command sequence.
///
/// # Example
///
/// ```rust
/// use netmend::driver::InteractiveEvent;
///
/// let events = vec![
///     InteractiveEvent::new("erase startup-config", "[confirm]"),
///     InteractiveEvent::regex("", r"(?m)^\S+#\s*$").unwrap(),
/// ];
/// assert_eq!(events.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct InteractiveEvent {
    /// The input to send (command or response).
    pub input: String,

    /// What to wait for after sending input.
    pub expect: Expect,

    /// Whether this input should be hidden in logs (e.g., passwords).
    pub hidden: bool,
}

impl InteractiveEvent {
    /// Send `input`, then wait for the literal text `expect`.
    pub fn new(input: impl Into<String>, expect: &str) -> Self {
        Self {
            input: input.into(),
            expect: Expect::Literal(Literal::new(expect)),
            hidden: false,
        }
    }

    /// Send `input`, then wait for a regex match.
    pub fn regex(input: impl Into<String>, pattern: &str) -> Result<Self> {
        let prompt = Regex::new(pattern).map_err(ChannelError::from)?;
        Ok(Self::with_prompt(input, prompt))
    }

    /// Send `input`, then wait for an already compiled prompt regex.
    pub fn with_prompt(input: impl Into<String>, prompt: Regex) -> Self {
        Self {
            input: input.into(),
            expect: Expect::Regex(prompt),
            hidden: false,
        }
    }

    /// Mark this event's input as hidden (for logging).
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

/// Result of an interactive command sequence.
#[derive(Debug, Clone)]
pub struct InteractiveResult {
    /// Results from each step in the sequence.
    pub steps: Vec<InteractiveStep>,

    /// Total time for the entire sequence.
    pub elapsed: Duration,
}

impl InteractiveResult {
    /// Get the final output (from the last step).
    pub fn final_output(&self) -> Option<&str> {
        self.steps.last().map(|s| s.output.as_str())
    }

    /// Get all outputs concatenated.
    pub fn full_output(&self) -> String {
        self.steps.iter().map(|s| s.output.as_str()).collect()
    }
}

/// Result of a single step in an interactive sequence.
#[derive(Debug, Clone)]
pub struct InteractiveStep {
    /// The input that was sent (masked if hidden).
    pub input: String,

    /// The output received after sending input.
    pub output: String,

    /// Time taken for this step.
    pub elapsed: Duration,
}

/// Builder for creating interactive command sequences.
///
/// ```rust
/// use netmend::driver::InteractiveBuilder;
///
/// let events = InteractiveBuilder::new()
///     .send("enable")
///     .expect("Password:")
///     .send_hidden("cisco")
///     .expect("#")
///     .build();
/// assert!(events[1].hidden);
/// ```
#[derive(Debug, Default)]
pub struct InteractiveBuilder {
    events: Vec<InteractiveEvent>,
}

impl InteractiveBuilder {
    /// Create a new interactive builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input to send. Must be followed by an `expect` call.
    pub fn send(self, input: impl Into<String>) -> InteractiveBuilderWithInput {
        InteractiveBuilderWithInput {
            builder: self,
            input: input.into(),
            hidden: false,
        }
    }

    /// Add a hidden input (like a password).
    pub fn send_hidden(self, input: impl Into<String>) -> InteractiveBuilderWithInput {
        InteractiveBuilderWithInput {
            builder: self,
            input: input.into(),
            hidden: true,
        }
    }

    /// Build the list of interactive events.
    pub fn build(self) -> Vec<InteractiveEvent> {
        self.events
    }
}

/// Intermediate state for the builder after `send()` is called.
#[derive(Debug)]
pub struct InteractiveBuilderWithInput {
    builder: InteractiveBuilder,
    input: String,
    hidden: bool,
}

impl InteractiveBuilderWithInput {
    /// Wait for a literal substring after sending the input.
    pub fn expect(self, text: &str) -> InteractiveBuilder {
        let Self {
            mut builder,
            input,
            hidden,
        } = self;
        builder
            .events
            .push(InteractiveEvent::new(input, text).with_hidden(hidden));
        builder
    }

    /// Wait for a prompt regex after sending the input.
    pub fn expect_prompt(self, prompt: Regex) -> InteractiveBuilder {
        let Self {
            mut builder,
            input,
            hidden,
        } = self;
        builder
            .events
            .push(InteractiveEvent::with_prompt(input, prompt).with_hidden(hidden));
        builder
    }
}

impl<T: Transport> Session<T> {
    /// Run an interactive command sequence.
    ///
    /// Each step waits up to the read timeout of the session's timing.
    /// Stops at the first step whose expected prompt does not appear.
    pub async fn send_interactive(
        &mut self,
        events: &[InteractiveEvent],
    ) -> Result<InteractiveResult> {
        let start = Instant::now();
        let timeout = self.timing().read_timeout();
        let mut steps = Vec::with_capacity(events.len());

        for event in events {
            let step_start = Instant::now();
            if event.hidden {
                self.send_hidden(&event.input).await?;
            } else {
                self.send(&event.input).await?;
            }

            let output = self.read_until_match(&event.expect, timeout).await?;
            debug!(
                "[{}] saw {:?} after {:?}",
                self.device(),
                event.expect.describe(),
                step_start.elapsed()
            );

            steps.push(InteractiveStep {
                input: if event.hidden {
                    String::from("********")
                } else {
                    event.input.clone()
                },
                output,
                elapsed: step_start.elapsed(),
            });
        }

        Ok(InteractiveResult {
            steps,
            elapsed: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingProfile;
    use crate::transport::ScriptedTransport;

    #[test]
    fn test_interactive_event_new() {
        let event = InteractiveEvent::new("reload", "[confirm]");
        assert_eq!(event.input, "reload");
        assert!(!event.hidden);
        assert_eq!(event.expect.describe(), "[confirm]");
    }

    #[test]
    fn test_interactive_event_bad_regex() {
        assert!(InteractiveEvent::regex("x", "(unclosed").is_err());
    }

    #[test]
    fn test_interactive_builder_order() {
        let prompt = Regex::new(r"(?m)^\S+#\s*$").unwrap();
        let events = InteractiveBuilder::new()
            .send("erase startup-config")
            .expect("[confirm]")
            .send("")
            .expect_prompt(prompt)
            .build();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].input, "erase startup-config");
        assert!(matches!(events[0].expect, Expect::Literal(_)));
        assert!(matches!(events[1].expect, Expect::Regex(_)));
        assert!(events[1].expect.is_match(b"\r\nRouter#"));
        assert!(events.iter().all(|e| !e.hidden));
    }

    #[tokio::test]
    async fn test_send_interactive_masks_hidden_input() {
        let transport = ScriptedTransport::new()
            .reply_to("enable", "Password: ")
            .reply_to("cisco", "\r\nRouter#");
        let mut session = Session::from_transport(transport, "10.0.0.1", 23)
            .with_timing(TimingProfile::immediate());

        let events = InteractiveBuilder::new()
            .send("enable")
            .expect("Password:")
            .send_hidden("cisco")
            .expect("Router#")
            .build();
        let result = session.send_interactive(&events).await.unwrap();

        assert_eq!(result.steps[1].input, "********");
        assert_eq!(result.final_output(), Some("\r\nRouter#"));
        assert!(result.full_output().starts_with("Password:"));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_interactive_missing_prompt_fails() {
        let transport = ScriptedTransport::new().reply_to("reload", "% Invalid input");
        let mut session = Session::from_transport(transport, "10.0.0.1", 23)
            .with_timing(TimingProfile::immediate());

        let err = session
            .send_interactive(&[InteractiveEvent::new("reload", "[confirm]")])
            .await
            .unwrap_err();
        assert!(err.is_read_timeout());
        session.close().await.unwrap();
    }
}
