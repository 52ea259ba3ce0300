//! Table-driven prompt wizards.
//!
//! Boot dialogs and setup wizards print a prompt, wait for an answer, and
//! ask the next question, but they skip questions whose answer is already
//! known and give no reliable end-of-output marker. A [`WizardScript`]
//! models one such dialog as a finite state machine:
//!
//! - each [`WizardState`] holds an ordered list of [`Transition`]s, each
//!   keyed by trigger substrings;
//! - after every answer the driver waits a settle delay and probes the
//!   console, then fires the first transition whose trigger appears in the
//!   probed output;
//! - when nothing matches, the state's [`Unrecognized`] policy decides:
//!   skip to another state keeping the output, probe again (bounded), or
//!   fail.

use std::collections::HashMap;
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::channel::Session;
use crate::error::{DriverError, Result};
use crate::transport::Transport;

/// Default cap on steps taken in one run.
const DEFAULT_MAX_STEPS: usize = 500;

/// Default probe size.
const DEFAULT_PROBE_BYTES: usize = 10_000;

/// An answer sent to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Accept the default (an empty line).
    Enter,
    /// Fixed text.
    Literal(String),
    /// Caller-supplied value, looked up by key in [`WizardInputs`].
    Input(String),
    /// Caller-supplied secret, sent without logging.
    Secret(String),
}

impl Reply {
    /// Fixed text reply.
    pub fn literal(text: impl Into<String>) -> Self {
        Reply::Literal(text.into())
    }

    /// Input reply.
    pub fn input(key: impl Into<String>) -> Self {
        Reply::Input(key.into())
    }

    /// Secret reply.
    pub fn secret(key: impl Into<String>) -> Self {
        Reply::Secret(key.into())
    }
}

/// Where the machine goes after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Remain in the current state (pagination, repeated prompts).
    Stay,
    /// Move to the named state.
    Goto(String),
    /// The dialog is complete.
    Finish,
}

impl Next {
    /// Move to `state`.
    pub fn goto(state: impl Into<String>) -> Self {
        Next::Goto(state.into())
    }
}

/// What a state does with output none of its triggers recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unrecognized {
    /// The prompt is optional: record the state as skipped and move on,
    /// testing the same output against the next state.
    Skip(Next),
    /// Log it and probe again, up to the profile's `max_unrecognized`.
    Retry,
    /// The prompt is mandatory.
    Fail,
}

/// One row of the transition table.
#[derive(Debug, Clone)]
pub struct Transition {
    triggers: Vec<String>,
    replies: Vec<Reply>,
    settle: Option<Duration>,
    next: Next,
}

impl Transition {
    /// Transition fired when `trigger` appears in the output.
    pub fn when(trigger: impl Into<String>) -> Self {
        Self {
            triggers: vec![trigger.into()],
            replies: Vec::new(),
            settle: None,
            next: Next::Stay,
        }
    }

    /// An alternative trigger for the same transition.
    pub fn or_when(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    /// Append a reply.
    pub fn reply(mut self, reply: Reply) -> Self {
        self.replies.push(reply);
        self
    }

    /// Override the settle delay after the replies.
    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = Some(settle);
        self
    }

    /// Set the next state.
    pub fn then(mut self, next: Next) -> Self {
        self.next = next;
        self
    }

    /// Whether any trigger occurs in `output`.
    pub fn matches(&self, output: &str) -> bool {
        self.triggers.iter().any(|t| output.contains(t.as_str()))
    }
}

/// A named state with its transitions.
#[derive(Debug, Clone)]
pub struct WizardState {
    name: String,
    transitions: Vec<Transition>,
    unrecognized: Unrecognized,
}

impl WizardState {
    /// A mandatory state with no transitions yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transitions: Vec::new(),
            unrecognized: Unrecognized::Fail,
        }
    }

    /// Add a transition. Earlier transitions take priority.
    pub fn on(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Make the state optional: when its prompt is absent, continue at `next`.
    pub fn optional(mut self, next: Next) -> Self {
        self.unrecognized = Unrecognized::Skip(next);
        self
    }

    /// Probe again on unrecognized output instead of failing.
    pub fn retry(mut self) -> Self {
        self.unrecognized = Unrecognized::Retry;
        self
    }

    /// State name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, output: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.matches(output))
    }
}

/// Values a wizard fills in.
#[derive(Debug, Default)]
pub struct WizardInputs {
    values: HashMap<String, String>,
    secrets: HashMap<String, SecretString>,
}

impl WizardInputs {
    /// No inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain value.
    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Add a secret.
    pub fn secret(mut self, key: impl Into<String>, secret: SecretString) -> Self {
        self.secrets.insert(key.into(), secret);
        self
    }
}

/// What a wizard run did.
#[derive(Debug, Clone, Default)]
pub struct WizardReport {
    /// States whose prompt was answered, in order (repeats included).
    pub answered: Vec<String>,

    /// Optional states whose prompt was never seen.
    pub skipped: Vec<String>,

    /// Unrecognized outputs tolerated by retrying states.
    pub unrecognized: usize,

    /// Everything probed during the run.
    pub transcript: String,
}

/// A dialog modelled as a state machine.
#[derive(Debug, Clone)]
pub struct WizardScript {
    name: String,
    wake: Vec<Reply>,
    wake_settle: Option<Duration>,
    states: IndexMap<String, WizardState>,
    probe_bytes: usize,
    max_steps: usize,
}

impl WizardScript {
    /// An empty script. The first state added is the start state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wake: Vec::new(),
            wake_settle: None,
            states: IndexMap::new(),
            probe_bytes: DEFAULT_PROBE_BYTES,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Something sent, followed by a settle delay, before the first probe.
    pub fn wake(mut self, reply: Reply) -> Self {
        self.wake.push(reply);
        self
    }

    /// Settle delay after each wake reply (defaults to the profile's settle).
    pub fn with_wake_settle(mut self, settle: Duration) -> Self {
        self.wake_settle = Some(settle);
        self
    }

    /// Bytes read per probe.
    pub fn with_probe_bytes(mut self, bytes: usize) -> Self {
        self.probe_bytes = bytes;
        self
    }

    /// Cap on steps in one run: fired transitions, skips and retries.
    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Add a state.
    pub fn state(mut self, state: WizardState) -> Self {
        self.states.insert(state.name.clone(), state);
        self
    }

    /// Script name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check that every `Goto` names a state of this script.
    pub fn validate(&self) -> Result<()> {
        let targets = self.states.values().flat_map(|state| {
            let skip = match &state.unrecognized {
                Unrecognized::Skip(next) => Some(next),
                _ => None,
            };
            state.transitions.iter().map(|t| &t.next).chain(skip)
        });
        for next in targets {
            if let Next::Goto(target) = next {
                if !self.states.contains_key(target) {
                    return Err(DriverError::UnknownState(target.clone()).into());
                }
            }
        }
        Ok(())
    }

    /// Run the dialog on `session`.
    pub async fn run<T: Transport>(
        &self,
        session: &mut Session<T>,
        inputs: &WizardInputs,
    ) -> Result<WizardReport> {
        self.validate()?;
        let mut report = WizardReport::default();
        let Some(mut state) = self.states.first().map(|(_, s)| s) else {
            return Ok(report);
        };

        info!("[{}] running {}", session.device(), self.name);

        let wake_settle = self.wake_settle.unwrap_or_else(|| session.timing().settle());
        let mut output = String::new();
        for reply in &self.wake {
            self.send_reply(session, reply, inputs).await?;
            output.push_str(&session.probe_after(wake_settle, self.probe_bytes).await?);
        }
        if self.wake.is_empty() {
            output = session.probe(self.probe_bytes).await?;
        }
        report.transcript.push_str(&output);

        let max_unrecognized = session.timing().max_unrecognized;
        let mut attempts = 0;
        let mut steps = 0;
        // Whether the current state has fired since it was entered
        let mut answered_here = false;

        loop {
            // Every pass counts toward the cap: fired, skipped or retried
            steps += 1;
            if steps > self.max_steps {
                return Err(DriverError::StepLimit {
                    script: self.name.clone(),
                    steps: self.max_steps,
                }
                .into());
            }

            if let Some(transition) = state.find(&output) {
                attempts = 0;
                debug!("[{}] {}: answering '{}'", session.device(), self.name, state.name);
                report.answered.push(state.name.clone());

                for reply in &transition.replies {
                    self.send_reply(session, reply, inputs).await?;
                }

                state = match &transition.next {
                    Next::Finish => break,
                    Next::Stay => {
                        answered_here = true;
                        state
                    }
                    Next::Goto(target) => {
                        answered_here = false;
                        self.lookup(target)?
                    }
                };

                let settle = transition.settle.unwrap_or_else(|| session.timing().settle());
                output = session.probe_after(settle, self.probe_bytes).await?;
                report.transcript.push_str(&output);
                continue;
            }

            match &state.unrecognized {
                Unrecognized::Skip(next) => {
                    if answered_here {
                        debug!("[{}] {}: leaving '{}'", session.device(), self.name, state.name);
                    } else {
                        warn!(
                            "[{}] {}: prompt for '{}' not observed, skipping",
                            session.device(),
                            self.name,
                            state.name
                        );
                        report.skipped.push(state.name.clone());
                    }
                    answered_here = false;
                    attempts = 0;
                    state = match next {
                        Next::Finish => break,
                        Next::Stay => {
                            output = session.probe(self.probe_bytes).await?;
                            report.transcript.push_str(&output);
                            state
                        }
                        Next::Goto(target) => self.lookup(target)?,
                    };
                }
                Unrecognized::Retry => {
                    attempts += 1;
                    report.unrecognized += 1;
                    if attempts > max_unrecognized {
                        return Err(DriverError::UnrecognizedPrompt {
                            state: state.name.clone(),
                            attempts: attempts - 1,
                            observed: output,
                        }
                        .into());
                    }
                    warn!(
                        "[{}] {}: unrecognized output in '{}' ({}/{}): {:?}",
                        session.device(),
                        self.name,
                        state.name,
                        attempts,
                        max_unrecognized,
                        output
                    );
                    output = session.probe(self.probe_bytes).await?;
                    report.transcript.push_str(&output);
                }
                Unrecognized::Fail => {
                    return Err(DriverError::MissingPrompt {
                        state: state.name.clone(),
                        observed: output,
                    }
                    .into());
                }
            }
        }

        info!(
            "[{}] {} finished: {} answered, {} skipped",
            session.device(),
            self.name,
            report.answered.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn lookup(&self, name: &str) -> Result<&WizardState> {
        self.states
            .get(name)
            .ok_or_else(|| DriverError::UnknownState(name.to_string()).into())
    }

    async fn send_reply<T: Transport>(
        &self,
        session: &mut Session<T>,
        reply: &Reply,
        inputs: &WizardInputs,
    ) -> Result<()> {
        match reply {
            Reply::Enter => session.send("").await,
            Reply::Literal(text) => session.send(text).await,
            Reply::Input(key) => {
                let value = inputs
                    .values
                    .get(key)
                    .ok_or_else(|| DriverError::MissingInput(key.clone()))?;
                session.send(value).await
            }
            Reply::Secret(key) => {
                let secret = inputs
                    .secrets
                    .get(key)
                    .ok_or_else(|| DriverError::MissingInput(key.clone()))?;
                session.send_hidden(secret.expose_secret()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingProfile;
    use crate::transport::ScriptedTransport;

    fn session(transport: ScriptedTransport) -> Session<ScriptedTransport> {
        Session::from_transport(transport, "10.0.0.1", 5021)
            .with_device("test")
            .with_timing(TimingProfile::immediate())
    }

    fn two_question_script() -> WizardScript {
        WizardScript::new("two questions")
            .wake(Reply::Enter)
            .state(
                WizardState::new("first")
                    .on(Transition::when("first? [y/n]")
                        .reply(Reply::literal("n"))
                        .then(Next::goto("second")))
                    .optional(Next::goto("second")),
            )
            .state(
                WizardState::new("second")
                    .on(Transition::when("second? [yes]")
                        .reply(Reply::Enter)
                        .then(Next::Finish))
                    .optional(Next::Finish),
            )
    }

    #[tokio::test]
    async fn test_all_prompts_answered() {
        let transport = ScriptedTransport::new()
            .reply_to("", "first? [y/n]: ")
            .reply_to("n", "second? [yes]: ");
        let log = transport.sent_log();
        let mut s = session(transport);

        let report = two_question_script()
            .run(&mut s, &WizardInputs::new())
            .await
            .unwrap();

        assert_eq!(report.answered, vec!["first", "second"]);
        assert!(report.skipped.is_empty());
        assert_eq!(log.lines(), vec!["", "n", ""]);
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_absent_prompt_is_skipped_and_output_reused() {
        // The first question is never asked; its output belongs to the second
        let transport = ScriptedTransport::new().reply_to("", "second? [yes]: ");
        let log = transport.sent_log();
        let mut s = session(transport);

        let report = two_question_script()
            .run(&mut s, &WizardInputs::new())
            .await
            .unwrap();

        assert_eq!(report.skipped, vec!["first"]);
        assert_eq!(report.answered, vec!["second"]);
        assert_eq!(log.lines(), vec!["", ""]);
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_prompts_at_all() {
        let mut s = session(ScriptedTransport::new().with_default_reply("Router>"));
        let report = two_question_script()
            .run(&mut s, &WizardInputs::new())
            .await
            .unwrap();
        assert_eq!(report.skipped, vec!["first", "second"]);
        s.close().await.unwrap();
    }

    fn pager_script() -> WizardScript {
        WizardScript::new("pager").state(
            WizardState::new("pages")
                .on(Transition::when("--More--").reply(Reply::literal(" ")))
                .on(Transition::when("AGREE").reply(Reply::Enter).then(Next::Finish))
                .retry(),
        )
    }

    #[tokio::test]
    async fn test_pagination_loop_with_retry() {
        let transport = ScriptedTransport::new()
            .with_greeting("page one --More--")
            .reply_to(" ", "page two --More--")
            .reply_to(" ", "garbage");
        let mut s = session(transport);

        // The garbage is tolerated, but with nothing further buffered the
        // empty probes also count as unrecognized and eventually hit the cap.
        let err = pager_script()
            .run(&mut s, &WizardInputs::new())
            .await
            .unwrap_err();
        match err {
            crate::Error::Driver(DriverError::UnrecognizedPrompt { state, attempts, .. }) => {
                assert_eq!(state, "pages");
                assert_eq!(attempts, TimingProfile::default().max_unrecognized);
            }
            other => panic!("unexpected error: {other}"),
        }
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_pagination_until_agree() {
        let transport = ScriptedTransport::new()
            .with_greeting("page one --More--")
            .reply_to(" ", "page two --More--")
            .reply_to(" ", "Please enter 'YES' or press <ENTER> to AGREE to the EULA: ");
        let log = transport.sent_log();
        let mut s = session(transport);

        let report = pager_script()
            .run(&mut s, &WizardInputs::new())
            .await
            .unwrap();
        assert_eq!(report.answered.len(), 3);
        assert_eq!(log.lines(), vec![" ", " ", ""]);
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_step_limit() {
        let transport = ScriptedTransport::new()
            .with_greeting("--More--")
            .with_default_reply("--More--");
        let mut s = session(transport);

        let err = pager_script()
            .with_max_steps(5)
            .run(&mut s, &WizardInputs::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Driver(DriverError::StepLimit { steps: 5, .. })
        ));
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_optional_states_skipping_in_a_cycle_hit_the_cap() {
        let script = WizardScript::new("ping-pong")
            .with_max_steps(8)
            .state(
                WizardState::new("a")
                    .on(Transition::when("a?").then(Next::Finish))
                    .optional(Next::goto("b")),
            )
            .state(
                WizardState::new("b")
                    .on(Transition::when("b?").then(Next::Finish))
                    .optional(Next::goto("a")),
            );
        let mut s = session(ScriptedTransport::new().with_greeting("Router>"));

        let err = script.run(&mut s, &WizardInputs::new()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Driver(DriverError::StepLimit { steps: 8, .. })
        ));
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_skip_in_place_hits_the_cap() {
        let script = WizardScript::new("waiting").with_max_steps(4).state(
            WizardState::new("banner")
                .on(Transition::when("ready").then(Next::Finish))
                .optional(Next::Stay),
        );
        let transport = ScriptedTransport::new().with_greeting("booting");
        let log = transport.sent_log();
        let mut s = session(transport);

        let err = script.run(&mut s, &WizardInputs::new()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Driver(DriverError::StepLimit { steps: 4, .. })
        ));
        assert!(log.lines().is_empty());
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_mandatory_prompt_missing() {
        let script = WizardScript::new("login").state(
            WizardState::new("login")
                .on(Transition::when("login:").reply(Reply::literal("admin")).then(Next::Finish)),
        );
        let mut s = session(ScriptedTransport::new().with_greeting("Router>"));
        let err = script.run(&mut s, &WizardInputs::new()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Driver(DriverError::MissingPrompt { .. })
        ));
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_inputs_and_secrets() {
        let script = WizardScript::new("fields")
            .state(
                WizardState::new("address")
                    .on(Transition::when("[192.168.45.45]:")
                        .reply(Reply::input("ip"))
                        .then(Next::goto("password"))),
            )
            .state(
                WizardState::new("password")
                    .on(Transition::when("password:")
                        .reply(Reply::secret("password"))
                        .then(Next::Finish)),
            );
        let transport = ScriptedTransport::new()
            .with_greeting("Enter an IPv4 address [192.168.45.45]:")
            .reply_to("10.1.1.1", "Enter new password:");
        let log = transport.sent_log();
        let mut s = session(transport);

        let inputs = WizardInputs::new()
            .value("ip", "10.1.1.1")
            .secret("password", SecretString::from(String::from("S3cret!")));
        script.run(&mut s, &inputs).await.unwrap();
        assert_eq!(log.lines(), vec!["10.1.1.1", "S3cret!"]);

        // Missing input is reported by key
        let mut s2 = session(
            ScriptedTransport::new().with_greeting("Enter an IPv4 address [192.168.45.45]:"),
        );
        let err = script.run(&mut s2, &WizardInputs::new()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Driver(DriverError::MissingInput(ref key)) if key == "ip"
        ));

        s.close().await.unwrap();
        s2.close().await.unwrap();
    }

    #[test]
    fn test_validate_unknown_state() {
        let script = WizardScript::new("broken").state(
            WizardState::new("a").optional(Next::goto("nowhere")),
        );
        assert!(matches!(
            script.validate().unwrap_err(),
            crate::Error::Driver(DriverError::UnknownState(ref s)) if s == "nowhere"
        ));
    }
}
