//! The conversations the reconciliation loop needs.
//!
//! Privilege escalation and command execution, the router first-boot
//! dialog, the appliance setup wizard, and the erase/reload sequence.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};

use super::interactive::{InteractiveBuilder, InteractiveResult};
use super::response::Response;
use super::wizard::{Next, Reply, Transition, WizardInputs, WizardReport, WizardScript, WizardState};
use crate::channel::{Session, SessionState};
use crate::config::TimingProfile;
use crate::error::{ChannelError, DriverError, Result};
use crate::platform::Mode;
use crate::transport::Transport;

/// Bytes read when looking for the first prompt of a session.
const WAKE_PROBE_BYTES: usize = 10_000;

/// Bytes read after `reload`.
const RELOAD_PROBE_BYTES: usize = 15_000;

/// Bring the session to privileged mode.
///
/// Wakes the console with three empty lines, then sends `enable` if the
/// prompt is non-privileged, answering a `Password:` prompt with
/// `enable_secret` when one is given. When no prompt line is recognized
/// at all, a `>` anywhere in the output still triggers escalation;
/// otherwise the session is left as it is and the caller's next read
/// decides.
pub async fn acquire_privileged<T: Transport>(
    session: &mut Session<T>,
    enable_secret: Option<&SecretString>,
) -> Result<()> {
    let settle = session.timing().settle() * 3 / 2;
    let mut output = String::new();
    for _ in 0..3 {
        session.send("").await?;
        output.push_str(&session.probe_after(settle, WAKE_PROBE_BYTES).await?);
    }

    let privileged = session.prompts().privileged.clone();
    let timeout = session.timing().read_timeout();

    match session.prompts().determine(&output) {
        Some(Mode::Privileged) => return Ok(()),
        Some(Mode::Configuration) => {
            session.send("end").await?;
            session.read_until_match(&privileged, timeout).await?;
            return Ok(());
        }
        Some(Mode::User) => {}
        None if output.contains('>') => {
            debug!("[{}] no prompt line recognized, '>' seen; escalating", session.device());
        }
        None => {
            warn!(
                "[{}] no CLI prompt recognized, continuing: {:?}",
                session.device(),
                output
            );
            return Ok(());
        }
    }

    let enable_reply = Regex::new(&format!(
        r"(?:{})|(?:(?m)[Pp]assword:\s*$)",
        privileged.regex().as_str()
    ))
    .map_err(ChannelError::from)?;

    session.send("enable").await?;
    let output = session.read_until_match(&enable_reply, timeout).await?;

    if output.contains("assword:") {
        let Some(secret) = enable_secret else {
            return Err(DriverError::PrivilegeAcquisitionFailed {
                message: String::from("enable password requested but none configured"),
            }
            .into());
        };
        let events = InteractiveBuilder::new()
            .send_hidden(secret.expose_secret())
            .expect_prompt(privileged.regex().clone())
            .build();
        session.send_interactive(&events).await?;
    }

    if session.state() != SessionState::Privileged {
        return Err(DriverError::PrivilegeAcquisitionFailed {
            message: String::from("privileged prompt not reached"),
        }
        .into());
    }
    info!("[{}] privileged mode acquired", session.device());
    Ok(())
}

/// Send each command and read until `prompt` appears after it.
///
/// Rejected commands are logged but do not stop the run.
pub async fn execute_commands<T, S>(
    session: &mut Session<T>,
    commands: &[S],
    prompt: &str,
) -> Result<Vec<Response>>
where
    T: Transport,
    S: AsRef<str>,
{
    let mut responses = Vec::with_capacity(commands.len());
    for command in commands {
        let command = command.as_ref();
        let start = Instant::now();
        session.send(command).await?;
        let result = session.read_until(prompt).await?;
        let response = Response::new(command, result, prompt, start.elapsed());
        if response.is_rejected() {
            warn!("[{}] command rejected: {:?}", session.device(), command);
        }
        responses.push(response);
    }
    Ok(responses)
}

/// Escalate, then run a rendered command list ending each read at `prompt`.
///
/// Used to push a configuration template over the console, e.g. the
/// hostname, domain, user and vty lines that enable remote access.
pub async fn configure_over_console<T, S>(
    session: &mut Session<T>,
    commands: &[S],
    prompt: &str,
    enable_secret: Option<&SecretString>,
) -> Result<Vec<Response>>
where
    T: Transport,
    S: AsRef<str>,
{
    acquire_privileged(session, enable_secret).await?;
    execute_commands(session, commands, prompt).await
}

/// The router first-boot dialog: decline the setup dialog and terminate
/// autoinstall. Both questions are optional.
pub fn first_boot_script() -> WizardScript {
    WizardScript::new("first boot")
        .wake(Reply::Enter)
        .wake(Reply::Enter)
        .with_probe_bytes(WAKE_PROBE_BYTES)
        .state(
            WizardState::new("initial configuration dialog")
                .on(Transition::when("dialog? [yes/no]")
                    .reply(Reply::literal("no"))
                    .then(Next::goto("autoinstall")))
                .optional(Next::goto("autoinstall")),
        )
        .state(
            WizardState::new("autoinstall")
                .on(Transition::when("autoinstall? [yes]")
                    .reply(Reply::Enter)
                    .then(Next::Finish))
                .optional(Next::Finish),
        )
}

/// Run the first-boot dialog, then give the device `boot_settle` to finish
/// coming up.
pub async fn initialize_router<T: Transport>(
    session: &mut Session<T>,
    boot_settle: Duration,
) -> Result<WizardReport> {
    let report = first_boot_script().run(session, &WizardInputs::new()).await?;
    if !boot_settle.is_zero() {
        info!("[{}] waiting {:?} for boot to settle", session.device(), boot_settle);
        tokio::time::sleep(boot_settle).await;
    }
    Ok(report)
}

/// Erase the startup configuration, confirming the prompt.
pub async fn erase_startup_config<T: Transport>(
    session: &mut Session<T>,
) -> Result<InteractiveResult> {
    let prompt = session.prompts().privileged.regex().clone();
    let events = InteractiveBuilder::new()
        .send("")
        .expect_prompt(prompt.clone())
        .send("erase startup-config")
        .expect("[confirm]")
        .send("")
        .expect_prompt(prompt)
        .build();
    let result = session.send_interactive(&events).await?;
    info!("[{}] startup configuration erased", session.device());
    Ok(result)
}

/// `reload`, refusing to save and confirming.
pub fn reload_script(timing: &TimingProfile) -> WizardScript {
    WizardScript::new("reload")
        .wake(Reply::literal("reload"))
        .with_wake_settle(timing.settle() * 2)
        .with_probe_bytes(RELOAD_PROBE_BYTES)
        .state(
            WizardState::new("save configuration")
                .on(Transition::when("[yes/no]:")
                    .reply(Reply::literal("no"))
                    .then(Next::goto("confirm")))
                .optional(Next::goto("confirm")),
        )
        .state(
            WizardState::new("confirm")
                .on(Transition::when("[confirm]")
                    .reply(Reply::Enter)
                    .then(Next::Finish))
                .optional(Next::Finish),
        )
}

/// Reload the device and wait `settle` for it to go down and come back.
pub async fn reload_device<T: Transport>(
    session: &mut Session<T>,
    settle: Duration,
) -> Result<WizardReport> {
    let script = reload_script(session.timing());
    let report = script.run(session, &WizardInputs::new()).await?;
    if !settle.is_zero() {
        info!("[{}] reloading, waiting {:?}", session.device(), settle);
        tokio::time::sleep(settle).await;
    }
    Ok(report)
}

/// Factory values an appliance shows as prompt defaults.
#[derive(Debug)]
pub struct FactoryDefaults {
    /// Initial login user.
    pub login_user: String,
    /// Initial login password.
    pub login_password: SecretString,
    /// Default hostname (also the login banner prefix).
    pub hostname: String,
    /// Default management address.
    pub address: String,
    /// Default management netmask.
    pub netmask: String,
    /// Default management gateway.
    pub gateway: String,
    /// Tail of the default DNS server list.
    pub dns_suffix: String,
}

impl Default for FactoryDefaults {
    fn default() -> Self {
        Self {
            login_user: String::from("admin"),
            login_password: SecretString::from(String::from("Admin123")),
            hostname: String::from("firepower"),
            address: String::from("192.168.45.45"),
            netmask: String::from("255.255.255.0"),
            gateway: String::from("192.168.45.1"),
            dns_suffix: String::from("::35"),
        }
    }
}

/// Answers for the appliance setup wizard.
#[derive(Debug)]
pub struct ApplianceSetup {
    /// Hostname to set.
    pub hostname: String,
    /// Management address.
    pub address: String,
    /// Management netmask.
    pub netmask: String,
    /// Management gateway.
    pub gateway: String,
    /// DNS server; the gateway is used when unset.
    pub dns: Option<String>,
    /// New admin password.
    pub new_password: SecretString,
    /// Factory values the prompts are recognized by.
    pub factory: FactoryDefaults,
}

impl ApplianceSetup {
    /// Setup answers with factory prompt defaults.
    pub fn new(
        hostname: impl Into<String>,
        address: impl Into<String>,
        netmask: impl Into<String>,
        gateway: impl Into<String>,
        new_password: SecretString,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            netmask: netmask.into(),
            gateway: gateway.into(),
            dns: None,
            new_password,
            factory: FactoryDefaults::default(),
        }
    }

    /// Set the DNS server.
    pub fn with_dns(mut self, dns: impl Into<String>) -> Self {
        self.dns = Some(dns.into());
        self
    }

    /// The wizard inputs these answers provide.
    pub fn inputs(&self) -> WizardInputs {
        WizardInputs::new()
            .value("login_user", self.factory.login_user.clone())
            .value("hostname", self.hostname.clone())
            .value("address", self.address.clone())
            .value("netmask", self.netmask.clone())
            .value("gateway", self.gateway.clone())
            .value("dns", self.dns.clone().unwrap_or_else(|| self.gateway.clone()))
            .secret(
                "login_password",
                SecretString::from(self.factory.login_password.expose_secret().to_string()),
            )
            .secret(
                "new_password",
                SecretString::from(self.new_password.expose_secret().to_string()),
            )
    }
}

/// The appliance initial-setup wizard.
///
/// Login and the EULA are mandatory. Every later field is optional: the
/// device only asks for values it does not already have.
pub fn appliance_setup_script(setup: &ApplianceSetup, timing: &TimingProfile) -> WizardScript {
    let factory = &setup.factory;

    // Optional single-field question answered with `reply`, then `next`.
    let field = |name: &str, trigger: String, reply: Reply, next: &str| {
        let next = if next.is_empty() {
            Next::Finish
        } else {
            Next::goto(next)
        };
        WizardState::new(name)
            .on(Transition::when(trigger).reply(reply).then(next.clone()))
            .optional(next)
    };

    WizardScript::new("appliance setup")
        .wake(Reply::Enter)
        .state(
            WizardState::new("login")
                .on(Transition::when(format!("{} login:", factory.hostname))
                    .reply(Reply::input("login_user"))
                    .reply(Reply::secret("login_password"))
                    .settle(timing.settle() * 5 / 2)
                    .then(Next::goto("eula prompt")))
                .retry(),
        )
        .state(
            WizardState::new("eula prompt")
                .on(Transition::when("Press <ENTER> to display the EULA")
                    .reply(Reply::Enter)
                    .then(Next::goto("eula")))
                .optional(Next::goto("new password")),
        )
        .state(
            WizardState::new("eula")
                .on(Transition::when("--More--").reply(Reply::literal(" ")))
                .on(Transition::when("AGREE to the EULA")
                    .reply(Reply::Enter)
                    .then(Next::goto("new password")))
                .retry(),
        )
        .state(
            WizardState::new("new password")
                .on(Transition::when("password:").reply(Reply::secret("new_password")))
                .optional(Next::goto("ipv4")),
        )
        .state(field("ipv4", "IPv4? (y/n) [y]:".into(), Reply::Enter, "ipv6"))
        .state(field("ipv6", "IPv6? (y/n) [n]:".into(), Reply::Enter, "addressing"))
        .state(field("addressing", "[manual]:".into(), Reply::Enter, "address"))
        .state(field(
            "address",
            format!("[{}]:", factory.address),
            Reply::input("address"),
            "netmask",
        ))
        .state(field(
            "netmask",
            format!("[{}]:", factory.netmask),
            Reply::input("netmask"),
            "gateway",
        ))
        .state(field(
            "gateway",
            format!("[{}]:", factory.gateway),
            Reply::input("gateway"),
            "hostname",
        ))
        .state(field(
            "hostname",
            format!("[{}]:", factory.hostname),
            Reply::input("hostname"),
            "dns",
        ))
        .state(field(
            "dns",
            format!("{}]:", factory.dns_suffix),
            Reply::input("dns"),
            "search domains",
        ))
        .state(
            WizardState::new("search domains")
                .on(Transition::when("'none' []:")
                    .reply(Reply::Enter)
                    .settle(timing.long_settle())
                    .then(Next::goto("local management")))
                .optional(Next::goto("local management")),
        )
        .state(field(
            "local management",
            "Manage the device locally? (yes/no) [yes]:".into(),
            Reply::Enter,
            "",
        ))
}

/// Run the appliance setup wizard.
pub async fn setup_appliance<T: Transport>(
    session: &mut Session<T>,
    setup: &ApplianceSetup,
) -> Result<WizardReport> {
    let script = appliance_setup_script(setup, session.timing());
    script.run(session, &setup.inputs()).await
}
