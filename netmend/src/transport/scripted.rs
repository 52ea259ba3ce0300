//! Scripted transport for testing.
//!
//! Records every line written and answers from canned replies, making it
//! easy to write deterministic tests for the script driver and the
//! reconciliation loop without a device.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use memchr::memmem;

use super::Transport;
use crate::error::{ChannelError, Result};

/// Shared, clonable log of the lines written to a [`ScriptedTransport`].
///
/// The transport is usually moved into a session, so tests keep a handle to
/// the log to inspect what was sent afterwards.
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<String>>>);

impl SentLog {
    pub(super) fn push(&self, line: &str) {
        if let Ok(mut lines) = self.0.lock() {
            lines.push(line.to_string());
        }
    }

    /// All lines written so far, in order.
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Lines written so far, skipping empty "press enter" lines.
    pub fn commands(&self) -> Vec<String> {
        self.lines().into_iter().filter(|l| !l.is_empty()).collect()
    }
}

/// A test double standing in for a device console.
///
/// Replies are looked up by the exact line written. Each key holds a queue
/// of replies consumed in order; once a queue is empty (or for unknown
/// lines) the default reply is used.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: HashMap<String, VecDeque<String>>,
    default_reply: String,
    pending: BytesMut,
    sent: SentLog,
    closed: bool,
}

impl ScriptedTransport {
    /// Create a transport with no canned output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Output that is already waiting when the session connects.
    pub fn with_greeting(mut self, text: &str) -> Self {
        self.pending.extend_from_slice(text.as_bytes());
        self
    }

    /// Queue `output` as the reply to the next write of exactly `line`.
    pub fn reply_to(mut self, line: &str, output: &str) -> Self {
        self.replies
            .entry(line.to_string())
            .or_default()
            .push_back(output.to_string());
        self
    }

    /// Reply used for lines without a queued reply.
    pub fn with_default_reply(mut self, output: &str) -> Self {
        self.default_reply = output.to_string();
        self
    }

    /// Handle to the log of written lines.
    pub fn sent_log(&self) -> SentLog {
        self.sent.clone()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for ScriptedTransport {
    async fn write(&mut self, text: &str) -> Result<()> {
        self.sent.push(text);
        let reply = self
            .replies
            .get_mut(text)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_reply.clone());
        self.pending.extend_from_slice(reply.as_bytes());
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_are_consumed_in_order() {
        let mut transport = ScriptedTransport::new()
            .reply_to("", "first")
            .reply_to("", "second")
            .with_default_reply("Router#");

        transport.write("").await.unwrap();
        assert_eq!(transport.read(100, Duration::ZERO).await.unwrap(), b"first");
        transport.write("").await.unwrap();
        assert_eq!(transport.read(100, Duration::ZERO).await.unwrap(), b"second");
        transport.write("").await.unwrap();
        assert_eq!(transport.read(100, Duration::ZERO).await.unwrap(), b"Router#");
    }

    #[tokio::test]
    async fn test_read_until_keeps_remainder() {
        let mut transport = ScriptedTransport::new().with_greeting("abc#def");
        let out = transport.read_until(b"#", Duration::ZERO).await.unwrap();
        assert_eq!(out, b"abc#");
        assert_eq!(transport.read(100, Duration::ZERO).await.unwrap(), b"def");
    }

    #[tokio::test]
    async fn test_read_until_missing_delimiter_times_out() {
        let mut transport = ScriptedTransport::new().with_greeting("Router>");
        let err = transport
            .read_until(b"#", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_read_timeout());
    }

    #[tokio::test]
    async fn test_sent_log_survives_move() {
        let transport = ScriptedTransport::new();
        let log = transport.sent_log();
        let mut moved = transport;
        moved.write("show version").await.unwrap();
        moved.write("").await.unwrap();
        assert_eq!(log.lines(), vec!["show version", ""]);
        assert_eq!(log.commands(), vec!["show version"]);
    }

    #[test]
    fn test_closed_transport_still_drains() {
        let mut transport = ScriptedTransport::new().with_greeting("Router#");
        tokio_test::block_on(async {
            tokio_test::assert_ok!(transport.close().await);
            let out = tokio_test::assert_ok!(transport.read(100, Duration::ZERO).await);
            assert_eq!(out, b"Router#");
            tokio_test::assert_err!(transport.read_until(b">", Duration::ZERO).await);
        });
    }
}
