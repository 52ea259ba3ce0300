//! Error types for netmend.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for netmend operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Console transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Script driver errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Running-config capture errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Configuration loading errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether this error came from the transport (unreachable or reset channel).
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Whether this error is a read that never saw what it waited for.
    pub fn is_read_timeout(&self) -> bool {
        matches!(self, Error::Channel(ChannelError::PatternTimeout { .. }))
    }
}

/// Transport layer errors (TCP connection to the console server).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Connection was closed by the remote end
    #[error("Connection disconnected")]
    Disconnected,

    /// Connect or whole-cycle deadline exceeded
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (pattern matching on the console stream).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The expected pattern was not observed before the deadline
    #[error("Pattern {pattern:?} not found within {timeout:?} (last output: {observed:?})")]
    PatternTimeout {
        pattern: String,
        timeout: Duration,
        observed: String,
    },

    /// Session is not connected
    #[error("Session not connected")]
    NotConnected,

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Driver layer errors (scripts, wizards, privilege escalation).
#[derive(Error, Debug)]
pub enum DriverError {
    /// A wizard kept producing output none of its triggers recognize
    #[error("Unrecognized prompt in state '{state}' after {attempts} attempts: {observed:?}")]
    UnrecognizedPrompt {
        state: String,
        attempts: usize,
        observed: String,
    },

    /// A mandatory wizard step never saw its trigger
    #[error("Expected prompt in state '{state}' was not observed: {observed:?}")]
    MissingPrompt { state: String, observed: String },

    /// A wizard kept cycling without finishing
    #[error("Script '{script}' did not finish within {steps} steps")]
    StepLimit { script: String, steps: usize },

    /// Wizard transition points at a state that does not exist
    #[error("Wizard has no state named '{0}'")]
    UnknownState(String),

    /// Wizard reply refers to an input that was not supplied
    #[error("Wizard input '{0}' was not supplied")]
    MissingInput(String),

    /// Failed to reach privileged mode
    #[error("Failed to acquire privileged mode: {message}")]
    PrivilegeAcquisitionFailed { message: String },

    /// Command template could not be rendered
    #[error("Template '{template}' references unknown placeholder '{name}'")]
    UnknownPlaceholder { template: String, name: String },

    /// Command template is malformed
    #[error("Malformed template '{template}': {message}")]
    MalformedTemplate { template: String, message: String },
}

/// Running-config capture errors.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Neither "Building configuration" nor "Current configuration" was seen
    #[error("Start-of-configuration marker not found in {bytes} bytes of output")]
    StartMarkerNotFound { bytes: usize },

    /// Configuration started but the trailing device prompt never appeared
    #[error("End-of-configuration prompt not found after {lines} configuration lines")]
    TerminatorNotFound { lines: usize },

    /// Failed to read or write a capture artifact
    #[error("Artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Configuration file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A device names a class with no profile
    #[error("Device '{device}' uses unknown device class '{class}'")]
    UnknownProfile { device: String, class: String },
}

/// Result type alias using netmend's Error.
pub type Result<T> = std::result::Result<T, Error>;
