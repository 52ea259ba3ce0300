//! One conversation with a device console.
//!
//! A [`Session`] owns a transport and layers the two synchronization
//! primitives every script is built from on top of it:
//!
//! - **settle then probe**: wait a fixed minimum delay, then take whatever
//!   output is buffered in one bounded read. Used where a device gives no
//!   reliable completion marker (boot dialogs, wizards, echoed config lines).
//! - **read until a pattern**: accumulate output until a prompt matcher
//!   fires on the tail of the buffer or the deadline passes.

use std::time::Duration;

use log::{debug, trace, warn};
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use super::patterns::PromptMatcher;
use crate::config::TimingProfile;
use crate::error::{ChannelError, Result};
use crate::platform::{Mode, PromptSet};
use crate::transport::{TelnetConfig, TelnetTransport, Transport};

/// Largest chunk requested from the transport per read while waiting for a
/// pattern.
const READ_CHUNK: usize = 64 * 1024;

/// How much output is quoted in timeout errors.
const OBSERVED_TAIL: usize = 200;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Closed, or never opened.
    Disconnected,
    /// Open; last prompt seen (if any) was non-privileged.
    Connected,
    /// Open; last prompt seen was privileged or configuration mode.
    Privileged,
}

/// An open conversation with one device.
///
/// Sessions are owned by whoever opened them and must be closed with
/// [`Session::close`]; dropping an open session tears the connection down
/// without the final newline and logs a warning.
pub struct Session<T: Transport> {
    transport: Option<T>,
    host: String,
    port: u16,
    device: String,
    state: SessionState,
    buffer: PatternBuffer,
    timing: TimingProfile,
    prompts: PromptSet,
}

impl Session<TelnetTransport> {
    /// Open a telnet session to a console port.
    pub async fn connect(config: TelnetConfig) -> Result<Self> {
        let host = config.host.clone();
        let port = config.port;
        let transport = TelnetTransport::connect(config).await?;
        debug!("connected to {}:{}", host, port);
        Ok(Self::from_transport(transport, host, port))
    }
}

impl<T: Transport> Session<T> {
    /// Wrap an already-open transport.
    pub fn from_transport(transport: T, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let timing = TimingProfile::default();
        Self {
            transport: Some(transport),
            device: format!("{}:{}", host, port),
            host,
            port,
            state: SessionState::Connected,
            buffer: PatternBuffer::new(timing.search_depth),
            timing,
            prompts: PromptSet::default(),
        }
    }

    /// Name used to prefix log lines (defaults to `host:port`).
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device = name.into();
        self
    }

    /// Replace the timing profile.
    pub fn with_timing(mut self, timing: TimingProfile) -> Self {
        self.buffer = PatternBuffer::new(timing.search_depth);
        self.timing = timing;
        self
    }

    /// Replace the prompt set used to track the CLI mode.
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    /// Remote host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remote port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Device name used in logs.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Timing profile in use.
    pub fn timing(&self) -> &TimingProfile {
        &self.timing
    }

    /// Prompt set in use.
    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    /// Whether the session still owns an open transport.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    fn transport_mut(&mut self) -> Result<&mut T> {
        self.transport
            .as_mut()
            .ok_or_else(|| ChannelError::NotConnected.into())
    }

    /// Send one line.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        debug!("[{}] send: {:?}", self.device, text);
        self.transport_mut()?.write(text).await
    }

    /// Send one line without logging its content.
    pub async fn send_hidden(&mut self, text: &str) -> Result<()> {
        debug!("[{}] send: ********", self.device);
        self.transport_mut()?.write(text).await
    }

    /// Wait the default settle delay, then read up to `max_bytes`.
    pub async fn probe(&mut self, max_bytes: usize) -> Result<String> {
        let settle = self.timing.settle();
        self.probe_after(settle, max_bytes).await
    }

    /// Wait `settle`, then take whatever output is buffered, up to
    /// `max_bytes`. An empty string means the device said nothing.
    pub async fn probe_after(&mut self, settle: Duration, max_bytes: usize) -> Result<String> {
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        let timeout = self.timing.probe_timeout();
        let raw = self.transport_mut()?.read(max_bytes, timeout).await?;

        self.buffer.clear();
        self.buffer.extend(&raw);
        let output = self.buffer.take_string();
        trace!("[{}] probe: {:?}", self.device, output);
        self.observe(&output);
        Ok(output)
    }

    /// Wait the per-command settle delay and discard the echo.
    pub async fn drain(&mut self, max_bytes: usize) -> Result<String> {
        let settle = self.timing.command_settle();
        self.probe_after(settle, max_bytes).await
    }

    /// Read until `delimiter` appears, within the read timeout.
    pub async fn read_until(&mut self, delimiter: &str) -> Result<String> {
        let timeout = self.timing.read_timeout();
        let raw = self
            .transport_mut()?
            .read_until(delimiter.as_bytes(), timeout)
            .await?;

        self.buffer.clear();
        self.buffer.extend(&raw);
        let output = self.buffer.take_string();
        trace!("[{}] read until {:?}: {:?}", self.device, delimiter, output);
        self.observe(&output);
        Ok(output)
    }

    /// Accumulate output until `matcher` fires on the tail of the buffer.
    ///
    /// Fails with [`ChannelError::PatternTimeout`] if the deadline passes
    /// first.
    pub async fn read_until_match<M>(&mut self, matcher: &M, timeout: Duration) -> Result<String>
    where
        M: PromptMatcher + ?Sized,
    {
        match self.collect(matcher, usize::MAX, timeout).await? {
            (output, true) => Ok(output),
            (output, false) => {
                let start = output.len().saturating_sub(OBSERVED_TAIL);
                let observed = output
                    .get(start..)
                    .unwrap_or(output.as_str())
                    .to_string();
                Err(ChannelError::PatternTimeout {
                    pattern: matcher.describe(),
                    timeout,
                    observed,
                }
                .into())
            }
        }
    }

    /// Like [`read_until_match`](Self::read_until_match) but bounded by a
    /// byte budget, and returning what was collected instead of failing
    /// when the budget or deadline runs out.
    pub async fn read_budgeted<M>(
        &mut self,
        matcher: &M,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<String>
    where
        M: PromptMatcher + ?Sized,
    {
        let (output, matched) = self.collect(matcher, max_bytes, timeout).await?;
        if !matched {
            debug!(
                "[{}] {:?} not seen after {} bytes",
                self.device,
                matcher.describe(),
                output.len()
            );
        }
        Ok(output)
    }

    async fn collect<M>(
        &mut self,
        matcher: &M,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<(String, bool)>
    where
        M: PromptMatcher + ?Sized,
    {
        let deadline = Instant::now() + timeout;
        self.buffer.clear();

        let matched = loop {
            if matcher.is_match(self.buffer.tail()) {
                break true;
            }
            if self.buffer.len() >= max_bytes {
                break false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let want = READ_CHUNK.min(max_bytes - self.buffer.len());
            let chunk = self.transport_mut()?.read(want, remaining).await?;
            if chunk.is_empty() {
                break false;
            }
            self.buffer.extend(&chunk);
        };

        let output = self.buffer.take_string();
        trace!("[{}] read: {:?}", self.device, output);
        self.observe(&output);
        Ok((output, matched))
    }

    /// Update the connection state from the prompt at the end of `output`.
    fn observe(&mut self, output: &str) {
        let next = match self.prompts.determine(output) {
            Some(Mode::Privileged | Mode::Configuration) => SessionState::Privileged,
            Some(Mode::User) => SessionState::Connected,
            None => return,
        };
        if next != self.state {
            debug!("[{}] state {:?} -> {:?}", self.device, self.state, next);
            self.state = next;
        }
    }

    /// Flush a final newline and close the transport.
    ///
    /// The flush is best effort; closing an already closed session is a
    /// no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.write("").await {
                debug!("[{}] final newline not sent: {}", self.device, e);
            }
            transport.close().await?;
            debug!("[{}] session closed", self.device);
        }
        self.state = SessionState::Disconnected;
        Ok(())
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.transport.is_some() {
            warn!(
                "[{}] session dropped without close(); connection torn down",
                self.device
            );
        }
    }
}
