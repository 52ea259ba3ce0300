//! Console transport layer.
//!
//! A transport is a raw bidirectional text channel to a device console:
//! write a line, read whatever is buffered, or read until a delimiter shows
//! up. Everything above this layer treats the received bytes as opaque text.

pub mod config;
mod scripted;
mod simulated;
mod telnet;

pub use config::TelnetConfig;
pub use scripted::{ScriptedTransport, SentLog};
pub use simulated::{SimulatedConsole, SimulatedDevice};
pub use telnet::TelnetTransport;

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// A raw text channel to a device.
pub trait Transport: Send {
    /// Send `text` followed by the line terminator. No acknowledgment is awaited.
    fn write(&mut self, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Return up to `max_bytes` of buffered output.
    ///
    /// Blocks until at least one byte is available or `timeout` elapses, in
    /// which case an empty buffer is returned.
    fn read(
        &mut self,
        max_bytes: usize,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Return everything up to and including `delimiter`.
    ///
    /// Fails with [`ChannelError::PatternTimeout`](crate::error::ChannelError::PatternTimeout)
    /// if the delimiter does not appear within `timeout`.
    fn read_until(
        &mut self,
        delimiter: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Shut the channel down.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
