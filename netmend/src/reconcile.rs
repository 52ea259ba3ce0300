//! The per-device reconciliation cycle.
//!
//! ```text
//! Idle -> CapturingGolden -> Wiping -> Reloading -> Reinitializing
//!      -> CapturingCurrent -> Diffing -> [Repairing] -> Done
//! ```
//!
//! Any error moves the cycle to `Failed`; it is never retried. Devices are
//! reconciled independently, so a failure only ends that device's cycle.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, error, info};

use crate::apply::apply_missing_config;
use crate::capture::{ArtifactStore, CaptureKind, RawCapture, capture_running_config};
use crate::channel::Session;
use crate::config::{DeviceDescriptor, DeviceProfile, ReconcileConfig};
use crate::diff::{MissingBlocksReport, compare_configs};
use crate::driver::{erase_startup_config, initialize_router, reload_device};
use crate::error::{Error, Result, TransportError};
use crate::normalize::CanonicalConfig;
use crate::transport::{TelnetConfig, TelnetTransport, Transport};

/// States of one device's cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Idle,
    /// Capturing the baseline configuration.
    CapturingGolden,
    /// Erasing the startup configuration.
    Wiping,
    Reloading,
    /// Answering the first-boot dialog on a fresh session.
    Reinitializing,
    CapturingCurrent,
    Diffing,
    /// Replaying the missing configuration.
    Repairing,
    Done,
    Failed,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Opens console sessions to devices.
pub trait Connector: Send + Sync {
    /// Transport of the sessions this connector opens.
    type Transport: Transport;

    /// Open a session to `device`, using the timing of `profile`.
    fn connect(
        &self,
        device: &DeviceDescriptor,
        profile: &DeviceProfile,
    ) -> impl Future<Output = Result<Session<Self::Transport>>> + Send;
}

/// Connects over telnet to the descriptor's host and port.
#[derive(Debug, Clone)]
pub struct TelnetConnector {
    connect_timeout: Duration,
    line_terminator: String,
}

impl TelnetConnector {
    /// Set the connect deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the line terminator.
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }
}

impl Default for TelnetConnector {
    fn default() -> Self {
        let defaults = TelnetConfig::default();
        Self {
            connect_timeout: defaults.connect_timeout,
            line_terminator: defaults.line_terminator,
        }
    }
}

impl Connector for TelnetConnector {
    type Transport = TelnetTransport;

    async fn connect(
        &self,
        device: &DeviceDescriptor,
        profile: &DeviceProfile,
    ) -> Result<Session<TelnetTransport>> {
        let config = TelnetConfig::new(&device.host, device.port)
            .with_connect_timeout(self.connect_timeout)
            .with_line_terminator(self.line_terminator.clone());
        let session = Session::connect(config).await?;
        Ok(session
            .with_device(&device.name)
            .with_timing(profile.timing.clone()))
    }
}

/// Result of one device's cycle.
#[derive(Debug)]
pub struct ReconcileOutcome {
    /// Device name.
    pub device: String,
    /// Every state entered, starting with `Idle`.
    pub history: Vec<ReconcileState>,
    /// The drift found, once the diff has run.
    pub report: Option<MissingBlocksReport>,
    /// Repair commands sent.
    pub commands_sent: usize,
    /// Why the cycle failed.
    pub error: Option<Error>,
}

impl ReconcileOutcome {
    fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            history: vec![ReconcileState::Idle],
            report: None,
            commands_sent: 0,
            error: None,
        }
    }

    /// Last state entered.
    pub fn final_state(&self) -> ReconcileState {
        self.history.last().copied().unwrap_or(ReconcileState::Idle)
    }

    /// Whether the cycle reached `Done`.
    pub fn is_success(&self) -> bool {
        self.final_state() == ReconcileState::Done
    }

    /// The state the cycle was in when it failed.
    pub fn failed_in(&self) -> Option<ReconcileState> {
        if self.final_state() != ReconcileState::Failed {
            return None;
        }
        self.history.iter().rev().nth(1).copied()
    }

    fn enter(&mut self, state: ReconcileState) {
        info!("[{}] {} -> {}", self.device, self.final_state(), state);
        self.history.push(state);
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.failed_in()) {
            (Some(e), Some(state)) => write!(f, "{}: failed while {}: {}", self.device, state, e),
            (Some(e), None) => write!(f, "{}: failed: {}", self.device, e),
            (None, _) => {
                write!(f, "{}: {}", self.device, self.final_state())?;
                if let Some(report) = &self.report {
                    write!(f, " ({}; {} commands sent)", report, self.commands_sent)?;
                }
                Ok(())
            }
        }
    }
}

/// Runs reconciliation cycles for the devices of a [`ReconcileConfig`].
pub struct Reconciler<C: Connector> {
    config: ReconcileConfig,
    connector: C,
}

impl Reconciler<TelnetConnector> {
    /// Reconcile over telnet.
    pub fn telnet(config: ReconcileConfig) -> Self {
        Self::new(config, TelnetConnector::default())
    }
}

impl<C: Connector> Reconciler<C> {
    /// Create a reconciler.
    pub fn new(config: ReconcileConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconcile every configured device concurrently.
    pub async fn run_all(&self) -> Vec<ReconcileOutcome> {
        join_all(self.config.devices.iter().map(|device| self.run(device))).await
    }

    /// Run one device's cycle to `Done` or `Failed`.
    pub async fn run(&self, device: &DeviceDescriptor) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::new(&device.name);

        let result = match self.config.cycle_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.cycle(device, &mut outcome))
                .await
                .unwrap_or_else(|_| Err(TransportError::Timeout(limit).into())),
            None => self.cycle(device, &mut outcome).await,
        };

        if let Err(e) = result {
            error!("[{}] reconciliation failed: {}", device.name, e);
            outcome.enter(ReconcileState::Failed);
            outcome.error = Some(e);
        }
        info!("{}", outcome);
        outcome
    }

    async fn cycle(&self, device: &DeviceDescriptor, outcome: &mut ReconcileOutcome) -> Result<()> {
        let profile = self.config.profile_for(device)?;
        let store = self.config.artifacts_dir.as_ref().map(ArtifactStore::new);

        outcome.enter(ReconcileState::CapturingGolden);
        let mut session = self.connector.connect(device, profile).await?;
        let result = self
            .wipe(&mut session, profile, store.as_ref(), outcome)
            .await;
        let golden = close_after(&mut session, result).await?;
        sleep(profile.reconnect_delay()).await;

        outcome.enter(ReconcileState::Reinitializing);
        let mut session = self.connector.connect(device, profile).await?;
        let result = self
            .restore(&mut session, device, &golden, store.as_ref(), outcome)
            .await;
        close_after(&mut session, result).await?;

        outcome.enter(ReconcileState::Done);
        Ok(())
    }

    /// Capture the golden configuration, then erase and reload.
    async fn wipe(
        &self,
        session: &mut Session<C::Transport>,
        profile: &DeviceProfile,
        store: Option<&ArtifactStore>,
        outcome: &mut ReconcileOutcome,
    ) -> Result<CanonicalConfig> {
        let capture = capture_running_config(session, CaptureKind::Golden, profile).await?;

        outcome.enter(ReconcileState::Wiping);
        let golden = canonicalize(store, &capture)?;
        erase_startup_config(session).await?;

        outcome.enter(ReconcileState::Reloading);
        reload_device(session, profile.reload_settle()).await?;
        Ok(golden)
    }

    /// Answer the first-boot dialog, capture, diff and repair.
    async fn restore(
        &self,
        session: &mut Session<C::Transport>,
        device: &DeviceDescriptor,
        golden: &CanonicalConfig,
        store: Option<&ArtifactStore>,
        outcome: &mut ReconcileOutcome,
    ) -> Result<()> {
        let profile = self.config.profile_for(device)?;
        initialize_router(session, profile.boot_settle()).await?;

        outcome.enter(ReconcileState::CapturingCurrent);
        let capture = capture_running_config(session, CaptureKind::Current, profile).await?;
        let current = canonicalize(store, &capture)?;

        outcome.enter(ReconcileState::Diffing);
        let report = compare_configs(golden, &current, &self.config.categories_for(device));
        debug!("[{}] drift: {}", device.name, report);
        outcome.report = Some(report.clone());

        if !report.is_empty() {
            outcome.enter(ReconcileState::Repairing);
            outcome.commands_sent = apply_missing_config(session, &report, profile).await?;
        }
        Ok(())
    }
}

/// Close `session` whatever `result` is. A close failure is only reported
/// when the step itself succeeded.
async fn close_after<T: Transport, R>(session: &mut Session<T>, result: Result<R>) -> Result<R> {
    match (session.close().await, result) {
        (Ok(()), result) => result,
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(original)) => {
            debug!("[{}] close after failure: {}", session.device(), e);
            Err(original)
        }
    }
}

/// The canonical form of a capture, through the artifact files when a
/// store is configured.
fn canonicalize(store: Option<&ArtifactStore>, capture: &RawCapture) -> Result<CanonicalConfig> {
    match store {
        Some(store) => store.round_trip(capture),
        None => Ok(capture.canonical()),
    }
}

async fn sleep(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
