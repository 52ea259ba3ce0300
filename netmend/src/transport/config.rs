//! Telnet connection configuration.

use std::time::Duration;

/// Telnet connection configuration.
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// Target host (console server hostname or IP address).
    pub host: String,

    /// TCP port of the device console (default: 23).
    pub port: u16,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Appended to every line written.
    pub line_terminator: String,
}

impl TelnetConfig {
    /// Create a configuration for `host:port` with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the line terminator.
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 23,
            connect_timeout: Duration::from_secs(10),
            line_terminator: String::from("\n"),
        }
    }
}
