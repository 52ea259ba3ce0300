//! An in-memory IOS-like console.
//!
//! Unlike [`ScriptedTransport`](super::ScriptedTransport), which answers
//! from canned replies, a [`SimulatedDevice`] keeps a running and a startup
//! configuration and interprets what it is sent: exec and configuration
//! modes, `show running-config`, `erase startup-config`, `reload` and the
//! first-boot dialog after a reload with an erased startup configuration.
//!
//! Several consoles can be opened on one device, one after the other, which
//! is what a reload in the middle of a reconciliation cycle needs.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::BytesMut;
use memchr::memmem;

use super::{SentLog, Transport};
use crate::error::{ChannelError, Result, TransportError};
use crate::normalize::indent_depth;

/// Global commands that open a sub-mode.
const SUBMODE_PREFIXES: [&str; 6] = [
    "interface ",
    "ip dhcp pool ",
    "router ",
    "ip access-list ",
    "line ",
    "vlan ",
];

const INVALID_INPUT: &str = "% Invalid input detected at '^' marker.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    User,
    Privileged,
    Config,
    SubConfig(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialog {
    EraseConfirm,
    ReloadSave,
    ReloadConfirm,
    Setup,
    Autoinstall,
}

#[derive(Debug)]
struct DeviceState {
    running: Vec<String>,
    startup: Option<Vec<String>>,
    factory: Vec<String>,
    mode: Mode,
    dialog: Option<Dialog>,
    first_boot: bool,
    reloads: usize,
    sent: SentLog,
}

impl DeviceState {
    fn hostname(&self) -> &str {
        self.running
            .iter()
            .find_map(|l| l.strip_prefix("hostname "))
            .unwrap_or("Router")
    }

    fn prompt(&self) -> String {
        let host = self.hostname();
        match self.mode {
            Mode::User => format!("{}>", host),
            Mode::Privileged => format!("{}#", host),
            Mode::Config => format!("{}(config)#", host),
            Mode::SubConfig(header) => {
                let sub = match self.running.get(header).map(String::as_str) {
                    Some(h) if h.starts_with("interface ") => "config-if",
                    Some(h) if h.starts_with("ip dhcp pool ") => "dhcp-config",
                    Some(h) if h.starts_with("router ") => "config-router",
                    Some(h) if h.starts_with("line ") => "config-line",
                    _ => "config-sub",
                };
                format!("{}({})#", host, sub)
            }
        }
    }

    fn handle(&mut self, line: &str) -> String {
        let echo = format!("{}\r\n", line);
        if let Some(dialog) = self.dialog {
            return echo + &self.answer(dialog, line);
        }
        if self.first_boot {
            self.first_boot = false;
            self.dialog = Some(Dialog::Setup);
            return echo
                + "\r\n         --- System Configuration Dialog ---\r\n\r\n\
                   Would you like to enter the initial configuration dialog? [yes/no]: ";
        }

        let command = line.trim();
        let reply = match self.mode {
            Mode::User | Mode::Privileged => self.exec(command),
            Mode::Config | Mode::SubConfig(_) => self.configure(command),
        };
        // An open dialog ends with its own question instead of a prompt
        if self.dialog.is_some() {
            echo + &reply
        } else {
            format!("{}{}{}", echo, reply, self.prompt())
        }
    }

    fn answer(&mut self, dialog: Dialog, line: &str) -> String {
        let answer = line.trim();
        match (dialog, answer) {
            (Dialog::EraseConfirm, "") => {
                self.dialog = None;
                self.startup = None;
                format!("[OK]\r\nErase of nvram: complete\r\n{}", self.prompt())
            }
            (Dialog::ReloadSave, "no") => {
                self.dialog = Some(Dialog::ReloadConfirm);
                String::from("Proceed with reload? [confirm]")
            }
            (Dialog::ReloadConfirm, "") => {
                self.dialog = None;
                self.reload();
                String::from("\r\n*** System going down for reload ***\r\n")
            }
            (Dialog::Setup, "no") => {
                self.dialog = Some(Dialog::Autoinstall);
                String::from("\r\nWould you like to terminate autoinstall? [yes]: ")
            }
            (Dialog::Setup, _) => String::from(
                "% Please answer 'yes' or 'no'.\r\n\
                 Would you like to enter the initial configuration dialog? [yes/no]: ",
            ),
            (Dialog::Autoinstall, _) => {
                self.dialog = None;
                self.mode = Mode::User;
                String::from("\r\nPress RETURN to get started!\r\n")
            }
            (_, _) => {
                self.dialog = None;
                self.prompt()
            }
        }
    }

    fn reload(&mut self) {
        self.reloads += 1;
        self.mode = Mode::User;
        match &self.startup {
            Some(startup) => self.running = startup.clone(),
            None => {
                self.running = self.factory.clone();
                self.first_boot = true;
            }
        }
    }

    fn exec(&mut self, command: &str) -> String {
        let privileged = self.mode == Mode::Privileged;
        match command {
            "" => String::new(),
            "enable" | "en" => {
                self.mode = Mode::Privileged;
                String::new()
            }
            "disable" => {
                self.mode = Mode::User;
                String::new()
            }
            "terminal length 0" => String::new(),
            "show running-config" if privileged => self.show_running_config(),
            "configure terminal" | "conf t" if privileged => {
                self.mode = Mode::Config;
                String::from("Enter configuration commands, one per line.  End with CNTL/Z.\r\n")
            }
            "erase startup-config" if privileged => {
                self.dialog = Some(Dialog::EraseConfirm);
                String::from(
                    "Erasing the nvram filesystem will remove all configuration files! \
                     Continue? [confirm]",
                )
            }
            "reload" if privileged => {
                if self.startup.as_ref() != Some(&self.running) {
                    self.dialog = Some(Dialog::ReloadSave);
                    String::from("\r\nSystem configuration has been modified. Save? [yes/no]: ")
                } else {
                    self.dialog = Some(Dialog::ReloadConfirm);
                    String::from("Proceed with reload? [confirm]")
                }
            }
            _ => format!("{}\r\n", INVALID_INPUT),
        }
    }

    fn show_running_config(&self) -> String {
        let body = self.running.join("\r\n");
        format!(
            "Building configuration...\r\n\r\nCurrent configuration : {} bytes\r\n!\r\n{}\r\n!\r\nend\r\n\r\n",
            body.len(),
            body
        )
    }

    fn configure(&mut self, command: &str) -> String {
        match command {
            "" => return String::new(),
            "end" => {
                self.mode = Mode::Privileged;
                return String::new();
            }
            "exit" => {
                self.mode = match self.mode {
                    Mode::SubConfig(_) => Mode::Config,
                    _ => Mode::Privileged,
                };
                return String::new();
            }
            _ => {}
        }

        if let Mode::SubConfig(header) = self.mode {
            if let Some(rest) = command.strip_prefix("no ") {
                self.remove_body_line(header, rest);
            } else {
                self.add_body_line(header, command);
            }
            return String::new();
        }

        if let Some(name) = command.strip_prefix("hostname ") {
            let line = format!("hostname {}", name);
            match self.running.iter().position(|l| l.starts_with("hostname ")) {
                Some(i) => self.running[i] = line,
                None => self.running.insert(0, line),
            }
        } else if let Some(rest) = command.strip_prefix("no ") {
            self.running.retain(|l| l != rest);
        } else if SUBMODE_PREFIXES.iter().any(|p| command.starts_with(p)) {
            let header = match self.running.iter().position(|l| l == command) {
                Some(i) => i,
                None => {
                    self.running.push(command.to_string());
                    self.running.len() - 1
                }
            };
            self.mode = Mode::SubConfig(header);
        } else if !self.running.iter().any(|l| l == command) {
            self.running.push(command.to_string());
        }
        String::new()
    }

    fn block_end(&self, header: usize) -> usize {
        let mut end = header + 1;
        while end < self.running.len() && indent_depth(&self.running[end]) > 0 {
            end += 1;
        }
        end
    }

    fn add_body_line(&mut self, header: usize, command: &str) {
        let line = format!(" {}", command);
        let end = self.block_end(header);
        if !self.running[header + 1..end].contains(&line) {
            self.running.insert(end, line);
        }
    }

    fn remove_body_line(&mut self, header: usize, command: &str) {
        let line = format!(" {}", command);
        let end = self.block_end(header);
        if let Some(i) = self.running[header + 1..end].iter().position(|l| *l == line) {
            self.running.remove(header + 1 + i);
        }
    }
}

/// A simulated device, shared by every console opened on it.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    /// A device whose running and startup configurations are `config`.
    /// It boots to the privileged prompt.
    pub fn new(config: &str) -> Self {
        let running = parse_config(config);
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                startup: Some(running.clone()),
                running,
                factory: parse_config("hostname Router"),
                mode: Mode::Privileged,
                dialog: None,
                first_boot: false,
                reloads: 0,
                sent: SentLog::default(),
            })),
        }
    }

    /// Configuration the device comes back with after a reload with an
    /// erased startup configuration.
    pub fn with_factory_config(self, config: &str) -> Self {
        self.lock().factory = parse_config(config);
        self
    }

    /// Start at the user prompt instead of the privileged one.
    pub fn unprivileged(self) -> Self {
        self.lock().mode = Mode::User;
        self
    }

    /// Open a console.
    pub fn console(&self) -> SimulatedConsole {
        SimulatedConsole {
            state: Arc::clone(&self.state),
            pending: BytesMut::new(),
            closed: false,
        }
    }

    /// The running configuration, one line per line.
    pub fn running_config(&self) -> String {
        self.lock().running.join("\n")
    }

    /// How many times the device has reloaded.
    pub fn reloads(&self) -> usize {
        self.lock().reloads
    }

    /// Every line written to any console of this device.
    pub fn sent_log(&self) -> SentLog {
        self.lock().sent.clone()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_config(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// One console connection to a [`SimulatedDevice`].
#[derive(Debug)]
pub struct SimulatedConsole {
    state: Arc<Mutex<DeviceState>>,
    pending: BytesMut,
    closed: bool,
}

impl Transport for SimulatedConsole {
    async fn write(&mut self, text: &str) -> Result<()> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sent.push(text);
        let output = state.handle(text);
        self.pending.extend_from_slice(output.as_bytes());
        Ok(())
    }

    async fn read(&mut self, max_bytes: usize, _timeout: Duration) -> Result<Vec<u8>> {
        let n = max_bytes.min(self.pending.len());
        Ok(self.pending.split_to(n).to_vec())
    }

    async fn read_until(&mut self, delimiter: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        match memmem::find(&self.pending, delimiter) {
            Some(pos) => Ok(self.pending.split_to(pos + delimiter.len()).to_vec()),
            None => Err(ChannelError::PatternTimeout {
                pattern: String::from_utf8_lossy(delimiter).into_owned(),
                timeout,
                observed: String::from_utf8_lossy(&self.pending).into_owned(),
            }
            .into()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
